// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Type Layer (§4.2): per-datatype encode/decode for the S7 user datatypes,
//! their wire size and their transport-size tag.
//!
//! This replaces the teacher crate's per-type structs (`field::Bool`,
//! `field::Word`, `field::Float`, ...), each implementing a shared `Field`
//! trait, with a single tagged enum per the design note in spec.md §9:
//! "Datatype dispatch is encoded in the source as type-code constants routed
//! through conditional chains. A tagged variant per datatype... is the
//! natural shape."

use crate::codec;
use crate::error::Error;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// The epoch S7 DATE values are counted from.
fn date_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1990, 1, 1).expect("1990-01-01 is a valid date")
}

/// An IEC_COUNTER instance-DB record (§4.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IecCounter {
    pub c_du: bool,
    pub load_r: bool,
    pub pv: i16,
    pub q: bool,
    pub cv: i16,
    pub c_du_o: bool,
}

/// An IEC_TIMER instance-DB record (§4.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IecTimer {
    pub inp: bool,
    pub pt_ms: i32,
    pub q: bool,
    pub et_ms: i32,
    pub state: u8,
    pub stime_ms: i32,
    pub atime_ms: i32,
}

/// A decoded or to-be-encoded S7 value, tagged by host-side shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bit(bool),
    Byte(u8),
    Char(char),
    Word(u16),
    Int(i16),
    DWord(u32),
    DInt(i32),
    Real(f32),
    Date(NaiveDate),
    TimeOfDay(NaiveTime),
    /// signed milliseconds
    Time(i32),
    /// milliseconds, wire-encoded in BCD time-base + count form
    S5Time(u32),
    DateTime(NaiveDateTime),
    Str(String),
    Counter(u16),
    Timer(u16),
    IecCounter(IecCounter),
    IecTimer(IecTimer),
}

/// The datatype tag that drives encode/decode dispatch (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7Type {
    Bit,
    Byte,
    Char,
    Word,
    Int,
    DWord,
    DInt,
    Real,
    Date,
    TimeOfDay,
    Time,
    S5Time,
    DateTime,
    /// `max_len` is the declared capacity (content bytes, not counting the
    /// 2-byte header); the wire reservation is always `2 + max_len`.
    Str {
        max_len: u8,
    },
    Counter,
    Timer,
    IecCounter,
    IecTimer,
}

impl S7Type {
    /// The S7 wire tag sent in ReadVar/WriteVar "any" item descriptors.
    pub fn transport_size(self) -> u8 {
        match self {
            S7Type::Bit => 1,
            S7Type::Byte => 2,
            S7Type::Char => 3,
            S7Type::Word => 4,
            S7Type::Int => 5,
            S7Type::DWord => 6,
            S7Type::DInt => 7,
            S7Type::Real => 8,
            S7Type::Date => 9,
            S7Type::TimeOfDay => 10,
            S7Type::Time => 11,
            S7Type::S5Time => 12,
            S7Type::DateTime => 13,
            S7Type::Str { .. } => 14,
            S7Type::Counter => 28,
            S7Type::Timer => 29,
            S7Type::IecCounter => 30,
            S7Type::IecTimer => 31,
        }
    }

    /// Number of elements to request in the "any" item descriptor's
    /// length-count field: 1 for every fixed-size type, the declared max
    /// length for STRING (the whole reservation is read/written at once).
    pub fn element_count(self) -> u16 {
        match self {
            S7Type::Str { max_len } => max_len as u16 + 2,
            _ => 1,
        }
    }

    /// Wire size in bytes. For STRING this depends on the content when a
    /// value is supplied (§3: `size(STRING) = 2 + len(bytes)`), otherwise on
    /// the declared maximum.
    pub fn wire_size(self, value: Option<&Value>) -> usize {
        match self {
            S7Type::Bit | S7Type::Byte | S7Type::Char => 1,
            S7Type::Word
            | S7Type::Int
            | S7Type::S5Time
            | S7Type::Counter
            | S7Type::Timer => 2,
            S7Type::DWord
            | S7Type::DInt
            | S7Type::Real
            | S7Type::Time
            | S7Type::TimeOfDay
            | S7Type::Date => 4,
            S7Type::DateTime => 8,
            S7Type::IecCounter => 8,
            S7Type::IecTimer => 19,
            S7Type::Str { max_len } => {
                let content_len = match value {
                    Some(Value::Str(s)) => s.len().min(max_len as usize),
                    _ => max_len as usize,
                };
                2 + content_len
            }
        }
    }

    pub fn encode(self, value: &Value) -> Result<Vec<u8>, Error> {
        match (self, value) {
            (S7Type::Bit, Value::Bit(b)) => Ok(vec![if *b { 1 } else { 0 }]),
            (S7Type::Byte, Value::Byte(b)) => Ok(vec![*b]),
            (S7Type::Char, Value::Char(c)) => {
                if !c.is_ascii() {
                    return Err(Error::RangeError(format!(
                        "CHAR value {:?} is not ASCII",
                        c
                    )));
                }
                Ok(vec![*c as u8])
            }
            (S7Type::Word, Value::Word(w)) => {
                let mut buf = [0u8; 2];
                codec::write_u16(&mut buf, *w)?;
                Ok(buf.to_vec())
            }
            (S7Type::Int, Value::Int(i)) => {
                let mut buf = [0u8; 2];
                codec::write_i16(&mut buf, *i)?;
                Ok(buf.to_vec())
            }
            (S7Type::DWord, Value::DWord(d)) => {
                let mut buf = [0u8; 4];
                codec::write_u32(&mut buf, *d)?;
                Ok(buf.to_vec())
            }
            (S7Type::DInt, Value::DInt(d)) => {
                let mut buf = [0u8; 4];
                codec::write_i32(&mut buf, *d)?;
                Ok(buf.to_vec())
            }
            (S7Type::Real, Value::Real(r)) => {
                let mut buf = [0u8; 4];
                codec::write_f32(&mut buf, *r)?;
                Ok(buf.to_vec())
            }
            (S7Type::Date, Value::Date(d)) => {
                let days = d.signed_duration_since(date_epoch()).num_days();
                if !(0..=u16::MAX as i64).contains(&days) {
                    return Err(Error::RangeError(format!(
                        "date {} is outside the representable DATE range",
                        d
                    )));
                }
                let mut buf = [0u8; 2];
                codec::write_u16(&mut buf, days as u16)?;
                Ok(buf.to_vec())
            }
            (S7Type::TimeOfDay, Value::TimeOfDay(t)) => {
                let ms = t.num_seconds_from_midnight() as u64 * 1000
                    + (t.nanosecond() / 1_000_000) as u64;
                if ms > 86_399_999 {
                    return Err(Error::RangeError(format!(
                        "time-of-day {} ms exceeds one day",
                        ms
                    )));
                }
                let mut buf = [0u8; 4];
                codec::write_u32(&mut buf, ms as u32)?;
                Ok(buf.to_vec())
            }
            (S7Type::Time, Value::Time(ms)) => {
                let mut buf = [0u8; 4];
                codec::write_i32(&mut buf, *ms)?;
                Ok(buf.to_vec())
            }
            (S7Type::S5Time, Value::S5Time(ms)) => encode_s5time(*ms),
            (S7Type::DateTime, Value::DateTime(dt)) => encode_datetime(dt),
            (S7Type::Str { max_len }, Value::Str(s)) => encode_string(*max_len, s),
            (S7Type::Counter, Value::Counter(c)) => {
                let mut buf = [0u8; 2];
                codec::write_u16(&mut buf, *c)?;
                Ok(buf.to_vec())
            }
            (S7Type::Timer, Value::Timer(t)) => {
                let mut buf = [0u8; 2];
                codec::write_u16(&mut buf, *t)?;
                Ok(buf.to_vec())
            }
            (S7Type::IecCounter, Value::IecCounter(c)) => encode_iec_counter(c),
            (S7Type::IecTimer, Value::IecTimer(t)) => encode_iec_timer(t),
            (t, v) => Err(Error::RangeError(format!(
                "value {:?} does not match datatype {:?}",
                v, t
            ))),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<Value, Error> {
        match self {
            S7Type::Bit => Ok(Value::Bit(codec::read_u8(bytes)? != 0)),
            S7Type::Byte => Ok(Value::Byte(codec::read_u8(bytes)?)),
            S7Type::Char => Ok(Value::Char(codec::read_u8(bytes)? as char)),
            S7Type::Word => Ok(Value::Word(codec::read_u16(bytes)?)),
            S7Type::Int => Ok(Value::Int(codec::read_i16(bytes)?)),
            S7Type::DWord => Ok(Value::DWord(codec::read_u32(bytes)?)),
            S7Type::DInt => Ok(Value::DInt(codec::read_i32(bytes)?)),
            S7Type::Real => Ok(Value::Real(codec::read_f32(bytes)?)),
            S7Type::Date => {
                let days = codec::read_u16(bytes)?;
                Ok(Value::Date(date_epoch() + chrono::Duration::days(days as i64)))
            }
            S7Type::TimeOfDay => {
                let ms = codec::read_u32(bytes)?;
                if ms > 86_399_999 {
                    return Err(Error::RangeError(format!(
                        "decoded time-of-day {} ms exceeds one day",
                        ms
                    )));
                }
                let t = NaiveTime::from_num_seconds_from_midnight_opt(
                    ms / 1000,
                    (ms % 1000) * 1_000_000,
                )
                .ok_or_else(|| Error::RangeError(format!("invalid time-of-day {} ms", ms)))?;
                Ok(Value::TimeOfDay(t))
            }
            S7Type::Time => Ok(Value::Time(codec::read_i32(bytes)?)),
            S7Type::S5Time => decode_s5time(bytes),
            S7Type::DateTime => decode_datetime(bytes),
            S7Type::Str { .. } => decode_string(bytes),
            S7Type::Counter => Ok(Value::Counter(codec::read_u16(bytes)?)),
            S7Type::Timer => Ok(Value::Timer(codec::read_u16(bytes)?)),
            S7Type::IecCounter => decode_iec_counter(bytes),
            S7Type::IecTimer => decode_iec_timer(bytes),
        }
    }
}

/// Smallest legal S5TIME time base (0=10ms,1=100ms,2=1s,3=10s) such that
/// `ms / factor < 1000`.
fn s5time_base_and_count(ms: u32) -> Result<(u8, u16), Error> {
    if !(10..=9_990_000).contains(&ms) {
        return Err(Error::RangeError(format!(
            "S5TIME value {} ms is outside the legal range 10..=9_990_000",
            ms
        )));
    }
    const FACTORS: [u32; 4] = [10, 100, 1_000, 10_000];
    for (base, factor) in FACTORS.iter().enumerate() {
        let count = ms / factor;
        if count < 1000 {
            return Ok((base as u8, count as u16));
        }
    }
    unreachable!("9_990_000 / 10_000 = 999 < 1000, a base must have matched")
}

fn encode_s5time(ms: u32) -> Result<Vec<u8>, Error> {
    let (base, count) = s5time_base_and_count(ms)?;
    let hundreds = (count / 100) as u8;
    let tens = ((count / 10) % 10) as u8;
    let units = (count % 10) as u8;
    let byte0 = (base << 4) | hundreds;
    let byte1 = (tens << 4) | units;
    Ok(vec![byte0, byte1])
}

fn decode_s5time(bytes: &[u8]) -> Result<Value, Error> {
    let byte0 = codec::read_u8(bytes)?;
    let byte1 = codec::read_u8(&bytes[1..])?;
    let base = byte0 >> 4;
    let hundreds = byte0 & 0x0F;
    let tens = byte1 >> 4;
    let units = byte1 & 0x0F;
    if hundreds > 9 || tens > 9 || units > 9 {
        return Err(Error::ProtocolError(format!(
            "invalid S5TIME BCD digits in bytes [{:02X} {:02X}]",
            byte0, byte1
        )));
    }
    let count = hundreds as u32 * 100 + tens as u32 * 10 + units as u32;
    let factor = match base {
        0 => 10,
        1 => 100,
        2 => 1_000,
        3 => 10_000,
        _ => {
            return Err(Error::ProtocolError(format!(
                "invalid S5TIME time base {}",
                base
            )))
        }
    };
    Ok(Value::S5Time(count * factor))
}

fn encode_datetime(dt: &NaiveDateTime) -> Result<Vec<u8>, Error> {
    let date = dt.date();
    let time = dt.time();
    let year_full = date.year();
    let year = if (2000..2090).contains(&year_full) {
        (year_full - 2000) as u8
    } else if (1990..2000).contains(&year_full) {
        (year_full - 1900) as u8
    } else {
        return Err(Error::RangeError(format!(
            "DATETIME year {} is outside the representable range",
            year_full
        )));
    };
    let ms = time.nanosecond() / 1_000_000;
    // chrono's Weekday::Sun as 1 to match the S7 wire convention (1=Sun..7=Sat).
    let weekday = ((date.weekday().num_days_from_sunday()) + 1) as u8;
    Ok(vec![
        codec::write_bcd_byte(year)?,
        codec::write_bcd_byte(date.month() as u8)?,
        codec::write_bcd_byte(date.day() as u8)?,
        codec::write_bcd_byte(time.hour() as u8)?,
        codec::write_bcd_byte(time.minute() as u8)?,
        codec::write_bcd_byte(time.second() as u8)?,
        codec::write_bcd_byte((ms / 10) as u8)?,
        ((ms % 10) as u8) << 4 | weekday,
    ])
}

fn decode_datetime(bytes: &[u8]) -> Result<Value, Error> {
    if bytes.len() < 8 {
        return Err(Error::ShortBuffer {
            wanted: 8,
            got: bytes.len(),
        });
    }
    let year_digits = codec::read_bcd_byte(bytes[0])?;
    let year = if year_digits < 90 {
        2000 + year_digits as i32
    } else {
        1900 + year_digits as i32
    };
    let month = codec::read_bcd_byte(bytes[1])?;
    let day = codec::read_bcd_byte(bytes[2])?;
    let hour = codec::read_bcd_byte(bytes[3])?;
    let minute = codec::read_bcd_byte(bytes[4])?;
    let second = codec::read_bcd_byte(bytes[5])?;
    let ms_hi = codec::read_bcd_byte(bytes[6])?;
    let ms_lo = bytes[7] >> 4;
    let ms = ms_hi as u32 * 10 + ms_lo as u32;

    let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .ok_or_else(|| Error::ProtocolError(format!("invalid DATETIME date {}-{}-{}", year, month, day)))?;
    let time = NaiveTime::from_hms_milli_opt(hour as u32, minute as u32, second as u32, ms)
        .ok_or_else(|| {
            Error::ProtocolError(format!(
                "invalid DATETIME time {}:{}:{}.{}",
                hour, minute, second, ms
            ))
        })?;
    Ok(Value::DateTime(NaiveDateTime::new(date, time)))
}

fn encode_string(max_len: u8, s: &str) -> Result<Vec<u8>, Error> {
    if !s.is_ascii() {
        return Err(Error::RangeError(
            "STRING values must be ASCII".to_string(),
        ));
    }
    let content = s.as_bytes();
    if content.len() > max_len as usize {
        return Err(Error::RangeError(format!(
            "STRING value of {} bytes exceeds declared max length {}",
            content.len(),
            max_len
        )));
    }
    let mut out = Vec::with_capacity(2 + max_len as usize);
    out.push(max_len);
    out.push(content.len() as u8);
    out.extend_from_slice(content);
    Ok(out)
}

fn decode_string(bytes: &[u8]) -> Result<Value, Error> {
    if bytes.len() < 2 {
        return Err(Error::ShortBuffer {
            wanted: 2,
            got: bytes.len(),
        });
    }
    let current_len = bytes[1] as usize;
    if bytes.len() < 2 + current_len {
        return Err(Error::ShortBuffer {
            wanted: 2 + current_len,
            got: bytes.len(),
        });
    }
    let content = &bytes[2..2 + current_len];
    let s = content.iter().map(|&b| b as char).collect::<String>();
    Ok(Value::Str(s))
}

fn encode_iec_counter(c: &IecCounter) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; 8];
    buf[0] = c.c_du as u8;
    buf[1] = c.load_r as u8;
    codec::write_i16(&mut buf[2..4], c.pv)?;
    buf[4] = c.q as u8;
    codec::write_i16(&mut buf[5..7], c.cv)?;
    buf[7] = c.c_du_o as u8;
    Ok(buf)
}

fn decode_iec_counter(bytes: &[u8]) -> Result<Value, Error> {
    if bytes.len() < 8 {
        return Err(Error::ShortBuffer {
            wanted: 8,
            got: bytes.len(),
        });
    }
    Ok(Value::IecCounter(IecCounter {
        c_du: bytes[0] != 0,
        load_r: bytes[1] != 0,
        pv: codec::read_i16(&bytes[2..4])?,
        q: bytes[4] != 0,
        cv: codec::read_i16(&bytes[5..7])?,
        c_du_o: bytes[7] != 0,
    }))
}

fn encode_iec_timer(t: &IecTimer) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; 19];
    buf[0] = t.inp as u8;
    codec::write_i32(&mut buf[1..5], t.pt_ms)?;
    buf[5] = t.q as u8;
    codec::write_i32(&mut buf[6..10], t.et_ms)?;
    buf[10] = t.state;
    codec::write_i32(&mut buf[11..15], t.stime_ms)?;
    codec::write_i32(&mut buf[15..19], t.atime_ms)?;
    Ok(buf)
}

fn decode_iec_timer(bytes: &[u8]) -> Result<Value, Error> {
    if bytes.len() < 19 {
        return Err(Error::ShortBuffer {
            wanted: 19,
            got: bytes.len(),
        });
    }
    Ok(Value::IecTimer(IecTimer {
        inp: bytes[0] != 0,
        pt_ms: codec::read_i32(&bytes[1..5])?,
        q: bytes[5] != 0,
        et_ms: codec::read_i32(&bytes[6..10])?,
        state: bytes[10],
        stime_ms: codec::read_i32(&bytes[11..15])?,
        atime_ms: codec::read_i32(&bytes[15..19])?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_roundtrip() {
        for b in [true, false] {
            let enc = S7Type::Bit.encode(&Value::Bit(b)).unwrap();
            assert_eq!(S7Type::Bit.decode(&enc).unwrap(), Value::Bit(b));
        }
    }

    #[test]
    fn char_encodes_to_wire_byte() {
        let enc = S7Type::Char.encode(&Value::Char('T')).unwrap();
        assert_eq!(enc, vec![0x54]);
    }

    #[test]
    fn real_roundtrip() {
        let enc = S7Type::Real.encode(&Value::Real(6.6)).unwrap();
        assert_eq!(enc, vec![0x40, 0xD3, 0x33, 0x33]);
        assert_eq!(S7Type::Real.decode(&enc).unwrap(), Value::Real(6.6));
    }

    #[test]
    fn date_epoch_boundaries() {
        let enc0 = S7Type::Date
            .encode(&Value::Date(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()))
            .unwrap();
        assert_eq!(enc0, vec![0x00, 0x00]);

        let enc365 = S7Type::Date
            .encode(&Value::Date(NaiveDate::from_ymd_opt(1991, 1, 1).unwrap()))
            .unwrap();
        assert_eq!(codec::read_u16(&enc365).unwrap(), 365);
    }

    #[test]
    fn s5time_boundaries() {
        let enc = encode_s5time(10).unwrap();
        assert_eq!(enc, vec![0x00, 0x01]);
        let enc_max = encode_s5time(9_990_000).unwrap();
        assert_eq!(enc_max[0] >> 4, 3);
        assert_eq!(
            (enc_max[0] & 0x0F) as u32 * 100 + (enc_max[1] >> 4) as u32 * 10 + (enc_max[1] & 0x0F) as u32,
            999
        );

        assert!(encode_s5time(9).is_err());
        assert!(encode_s5time(0).is_err());
        assert!(encode_s5time(9_990_001).is_err());
    }

    #[test]
    fn s5time_roundtrip() {
        for ms in [10u32, 250, 990, 1_000, 9_990, 99_900, 999_000, 9_990_000] {
            let enc = encode_s5time(ms).unwrap();
            let dec = decode_s5time(&enc).unwrap();
            assert_eq!(dec, Value::S5Time(ms));
        }
    }

    #[test]
    fn datetime_decode_example() {
        let bytes = [0x22, 0x09, 0x08, 0x17, 0x07, 0x25, 0x38, 0x04];
        let v = S7Type::DateTime.decode(&bytes).unwrap();
        let expected = NaiveDateTime::new(
            NaiveDate::from_ymd_opt(2022, 9, 8).unwrap(),
            NaiveTime::from_hms_milli_opt(17, 7, 25, 380).unwrap(),
        );
        assert_eq!(v, Value::DateTime(expected));
    }

    #[test]
    fn datetime_year_boundary() {
        let mut bytes = [0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01];
        let v = S7Type::DateTime.decode(&bytes).unwrap();
        match v {
            Value::DateTime(dt) => assert_eq!(dt.date().year(), 2000),
            _ => panic!(),
        }
        bytes[0] = 0x91; // year digits 91 -> 1991
        let v = S7Type::DateTime.decode(&bytes).unwrap();
        match v {
            Value::DateTime(dt) => assert_eq!(dt.date().year(), 1991),
            _ => panic!(),
        }
    }

    #[test]
    fn string_encodes_with_header() {
        let enc = S7Type::Str { max_len: 254 }
            .encode(&Value::Str("Hello World".to_string()))
            .unwrap();
        assert_eq!(enc[0], 0xFE);
        assert_eq!(enc[1], 0x0B);
        assert_eq!(&enc[2..13], b"Hello World");
    }

    #[test]
    fn string_decode_truncates_at_current_length() {
        let mut bytes = vec![10u8, 3];
        bytes.extend_from_slice(b"abcdefghij");
        let v = decode_string(&bytes).unwrap();
        assert_eq!(v, Value::Str("abc".to_string()));
    }

    #[test]
    fn iec_counter_roundtrip() {
        let c = IecCounter {
            c_du: true,
            load_r: false,
            pv: 42,
            q: true,
            cv: -7,
            c_du_o: false,
        };
        let enc = S7Type::IecCounter.encode(&Value::IecCounter(c)).unwrap();
        assert_eq!(enc.len(), 8);
        assert_eq!(S7Type::IecCounter.decode(&enc).unwrap(), Value::IecCounter(c));
    }

    #[test]
    fn iec_timer_roundtrip() {
        let t = IecTimer {
            inp: true,
            pt_ms: 5000,
            q: false,
            et_ms: 1234,
            state: 2,
            stime_ms: -1,
            atime_ms: 99,
        };
        let enc = S7Type::IecTimer.encode(&Value::IecTimer(t)).unwrap();
        assert_eq!(enc.len(), 19);
        assert_eq!(S7Type::IecTimer.decode(&enc).unwrap(), Value::IecTimer(t));
    }

    #[test]
    fn wire_size_matches_size_bytes_contract() {
        assert_eq!(S7Type::Bit.wire_size(None), 1);
        assert_eq!(S7Type::Byte.wire_size(None), 1);
        assert_eq!(S7Type::Word.wire_size(None), 2);
        assert_eq!(S7Type::DWord.wire_size(None), 4);
        assert_eq!(S7Type::DateTime.wire_size(None), 8);
        assert_eq!(S7Type::IecTimer.wire_size(None), 19);
    }
}
