// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Address Parser (§4.3): turns operand strings such as `DB10.DBX4.2`,
//! `I0.0`, `M3.7`, `C5` or `T12` into an [`Address`], and formats one back
//! to its canonical string.

use crate::constant::Area;
use crate::error::Error;
use std::fmt;

/// A parsed S7 operand: an area, an optional DB/DI block number, a byte
/// offset and, for bit-addressed operands, a bit offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub area: Area,
    /// Non-zero only for `Area::DataBlocks`/`Area::InstanceDb`.
    pub block_number: u16,
    pub byte_offset: u32,
    /// 0-7, only meaningful for bit-addressed operands (`DBX`/`I`/`Q`/`M`).
    pub bit_offset: u8,
}

impl Address {
    fn new_byte(area: Area, block_number: u16, byte_offset: u32) -> Address {
        Address {
            area,
            block_number,
            byte_offset,
            bit_offset: 0,
        }
    }

    fn new_bit(area: Area, block_number: u16, byte_offset: u32, bit_offset: u8) -> Address {
        Address {
            area,
            block_number,
            byte_offset,
            bit_offset,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.area {
            Area::DataBlocks => {
                write!(f, "DB{}.DBX{}.{}", self.block_number, self.byte_offset, self.bit_offset)
            }
            Area::InstanceDb => {
                write!(f, "DI{}.DBX{}.{}", self.block_number, self.byte_offset, self.bit_offset)
            }
            Area::Inputs => write!(f, "I{}.{}", self.byte_offset, self.bit_offset),
            Area::Outputs => write!(f, "Q{}.{}", self.byte_offset, self.bit_offset),
            Area::Flags => write!(f, "M{}.{}", self.byte_offset, self.bit_offset),
            Area::Counter => write!(f, "C{}", self.byte_offset),
            Area::Timer => write!(f, "T{}", self.byte_offset),
        }
    }
}

fn bad(addr: &str, why: &str) -> Error {
    Error::AddressError(format!("{:?}: {}", addr, why))
}

fn parse_uint<T>(addr: &str, s: &str, what: &str) -> Result<T, Error>
where
    T: std::str::FromStr,
{
    s.parse::<T>()
        .map_err(|_| bad(addr, &format!("{} {:?} is not a valid unsigned integer", what, s)))
}

fn parse_bit(addr: &str, s: &str) -> Result<u8, Error> {
    let bit: u8 = parse_uint(addr, s, "bit offset")?;
    if bit > 7 {
        return Err(bad(addr, &format!("bit offset {} is out of range 0..=7", bit)));
    }
    Ok(bit)
}

/// Parses `DB<n>.DBX<byte>.<bit>`, `DB<n>.DBX<byte>`, `DI<n>.DBX<byte>.<bit>`,
/// `I<byte>.<bit>`, `Q<byte>.<bit>`, `M<byte>.<bit>`, `C<n>` or `T<n>`,
/// case-insensitively.
pub fn parse(addr: &str) -> Result<Address, Error> {
    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return Err(bad(addr, "empty address"));
    }
    let upper = trimmed.to_ascii_uppercase();

    if let Some(rest) = upper.strip_prefix("DB").or_else(|| upper.strip_prefix("DI")) {
        let area = if upper.starts_with("DB") {
            Area::DataBlocks
        } else {
            Area::InstanceDb
        };
        let mut parts = rest.splitn(2, ".DBX");
        let db_part = parts
            .next()
            .ok_or_else(|| bad(addr, "missing block number"))?;
        let tail = parts
            .next()
            .ok_or_else(|| bad(addr, "expected '.DBX<byte>[.<bit>]' after block number"))?;
        let block_number: u16 = parse_uint(addr, db_part, "block number")?;

        let mut tail_parts = tail.splitn(2, '.');
        let byte_part = tail_parts.next().unwrap_or("");
        let byte_offset: u32 = parse_uint(addr, byte_part, "byte offset")?;
        let bit_offset = match tail_parts.next() {
            Some(bit_part) => parse_bit(addr, bit_part)?,
            None => 0,
        };
        return Ok(Address::new_bit(area, block_number, byte_offset, bit_offset));
    }

    if let Some(rest) = upper.strip_prefix('I') {
        let (byte_part, bit_part) = split_byte_bit(addr, rest)?;
        let byte_offset: u32 = parse_uint(addr, byte_part, "byte offset")?;
        let bit_offset = parse_bit(addr, bit_part)?;
        return Ok(Address::new_bit(Area::Inputs, 0, byte_offset, bit_offset));
    }
    if let Some(rest) = upper.strip_prefix('Q') {
        let (byte_part, bit_part) = split_byte_bit(addr, rest)?;
        let byte_offset: u32 = parse_uint(addr, byte_part, "byte offset")?;
        let bit_offset = parse_bit(addr, bit_part)?;
        return Ok(Address::new_bit(Area::Outputs, 0, byte_offset, bit_offset));
    }
    if let Some(rest) = upper.strip_prefix('M') {
        let (byte_part, bit_part) = split_byte_bit(addr, rest)?;
        let byte_offset: u32 = parse_uint(addr, byte_part, "byte offset")?;
        let bit_offset = parse_bit(addr, bit_part)?;
        return Ok(Address::new_bit(Area::Flags, 0, byte_offset, bit_offset));
    }
    if let Some(rest) = upper.strip_prefix('C') {
        let n: u32 = parse_uint(addr, rest, "counter number")?;
        return Ok(Address::new_byte(Area::Counter, 0, n));
    }
    if let Some(rest) = upper.strip_prefix('T') {
        let n: u32 = parse_uint(addr, rest, "timer number")?;
        return Ok(Address::new_byte(Area::Timer, 0, n));
    }

    Err(bad(addr, "unrecognized address form"))
}

fn split_byte_bit<'a>(addr: &str, rest: &'a str) -> Result<(&'a str, &'a str), Error> {
    let mut parts = rest.splitn(2, '.');
    let byte_part = parts.next().unwrap_or("");
    let bit_part = parts
        .next()
        .ok_or_else(|| bad(addr, "expected '<byte>.<bit>'"))?;
    Ok((byte_part, bit_part))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_db_with_bit() {
        let a = parse("DB10.DBX4.2").unwrap();
        assert_eq!(a.area, Area::DataBlocks);
        assert_eq!(a.block_number, 10);
        assert_eq!(a.byte_offset, 4);
        assert_eq!(a.bit_offset, 2);
    }

    #[test]
    fn parses_db_without_bit() {
        let a = parse("DB1.DBX0").unwrap();
        assert_eq!(a.bit_offset, 0);
        assert_eq!(a.byte_offset, 0);
    }

    #[test]
    fn parses_case_insensitively() {
        let a = parse("db1.dbx4.2").unwrap();
        assert_eq!(a.area, Area::DataBlocks);
        assert_eq!(a.byte_offset, 4);
        assert_eq!(a.bit_offset, 2);
    }

    #[test]
    fn parses_inputs_outputs_flags() {
        assert_eq!(parse("I0.0").unwrap().area, Area::Inputs);
        assert_eq!(parse("Q1.7").unwrap().area, Area::Outputs);
        assert_eq!(parse("M3.7").unwrap().area, Area::Flags);
        assert_eq!(parse("M3.7").unwrap().block_number, 0);
    }

    #[test]
    fn parses_counter_and_timer() {
        let c = parse("C5").unwrap();
        assert_eq!(c.area, Area::Counter);
        assert_eq!(c.byte_offset, 5);
        assert_eq!(c.block_number, 0);

        let t = parse("T12").unwrap();
        assert_eq!(t.area, Area::Timer);
        assert_eq!(t.byte_offset, 12);
    }

    #[test]
    fn rejects_bit_out_of_range() {
        assert!(parse("I0.8").is_err());
        assert!(parse("DB1.DBX0.9").is_err());
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse("").is_err());
        assert!(parse("DB").is_err());
        assert!(parse("XYZ1.2").is_err());
        assert!(parse("I0").is_err());
    }

    #[test]
    fn display_roundtrips() {
        for s in ["DB10.DBX4.2", "I0.0", "Q1.7", "M3.7", "C5", "T12"] {
            let a = parse(s).unwrap();
            let formatted = a.to_string();
            let reparsed = parse(&formatted).unwrap();
            assert_eq!(a, reparsed);
        }
    }

    #[test]
    fn di_area_parses() {
        let a = parse("DI2.DBX1.0").unwrap();
        assert_eq!(a.area, Area::InstanceDb);
        assert_eq!(a.block_number, 2);
    }
}
