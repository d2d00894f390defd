// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! S7 Message Layer (§4.5): header/parameter/data assembly for job/ack-data
//! and userdata PDUs, ReadVar/WriteVar item descriptors and data blocks,
//! UserData (SZL/time) parameter framing, and request chunking.
//!
//! Grounded on the teacher's fixed-byte telegrams in `transport.rs`
//! (`READ_WRITE_TELEGRAM`, `PDU_NEGOTIATION_TELEGRAM`, `WARM_START_TELEGRAM`,
//! `COLD_START_TELEGRAM`, `STOP_TELEGRAM`, `SZL_FIRST_TELEGRAM`,
//! `SZL_NEXT_TELEGRAM`), generalized from byte-offset patches into builders
//! over arbitrary tag lists, and on the item-descriptor shape in
//! `other_examples/...Larsiiii-s7client.../request_item.rs`.

use crate::codec;
use crate::constant::*;
use crate::error::Error;
use crate::tag::Tag;
use crate::types::{S7Type, Value};
use chrono::NaiveDateTime;

const P_PROGRAM: &[u8] = b"P_PROGRAM";

fn job_header(rosctr: u8, pdu_ref: u16, param_len: u16, data_len: u16) -> Vec<u8> {
    let mut h = Vec::with_capacity(10);
    h.push(0x32);
    h.push(rosctr);
    h.extend_from_slice(&[0, 0]);
    h.extend_from_slice(&pdu_ref.to_be_bytes());
    h.extend_from_slice(&param_len.to_be_bytes());
    h.extend_from_slice(&data_len.to_be_bytes());
    h
}

pub(crate) fn build_pdu(rosctr: u8, pdu_ref: u16, params: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = job_header(rosctr, pdu_ref, params.len() as u16, data.len() as u16);
    out.extend_from_slice(params);
    out.extend_from_slice(data);
    out
}

/// A parsed S7 PDU, borrowing its parameter/data slices from the decoded
/// frame buffer.
pub(crate) struct Response<'a> {
    pub rosctr: u8,
    pub pdu_ref: u16,
    pub error_class: u8,
    pub error_code: u8,
    pub params: &'a [u8],
    pub data: &'a [u8],
}

pub(crate) fn parse_pdu(buf: &[u8]) -> Result<Response<'_>, Error> {
    if buf.len() < 10 {
        return Err(Error::ShortBuffer {
            wanted: 10,
            got: buf.len(),
        });
    }
    if buf[0] != 0x32 {
        return Err(Error::ProtocolError(format!(
            "unexpected S7 protocol-id 0x{:02X} (want 0x32)",
            buf[0]
        )));
    }
    let rosctr = buf[1];
    let pdu_ref = codec::read_u16(&buf[4..6])?;
    let param_len = codec::read_u16(&buf[6..8])? as usize;
    let data_len = codec::read_u16(&buf[8..10])? as usize;

    // Per §4.5: a plain Ack (whole-PDU failure, no parameter/data payload)
    // carries error-class/error-code as two extra header bytes; AckData
    // carries its per-item results instead and leaves them implicit-zero.
    let (error_class, error_code, header_len) = if rosctr == ROSCTR_ACK {
        if buf.len() < 12 {
            return Err(Error::ShortBuffer {
                wanted: 12,
                got: buf.len(),
            });
        }
        (buf[10], buf[11], 12)
    } else {
        (0, 0, 10)
    };

    let want = header_len + param_len + data_len;
    if buf.len() < want {
        return Err(Error::ShortBuffer {
            wanted: want,
            got: buf.len(),
        });
    }
    Ok(Response {
        rosctr,
        pdu_ref,
        error_class,
        error_code,
        params: &buf[header_len..header_len + param_len],
        data: &buf[header_len + param_len..want],
    })
}

// ---- SetupCommunication -----------------------------------------------

pub(crate) fn build_setup_communication(pdu_ref: u16) -> Vec<u8> {
    let mut p = Vec::with_capacity(8);
    p.push(FUNC_SETUP_COMMUNICATION);
    p.push(0x00);
    p.extend_from_slice(&MAX_AMQ.to_be_bytes());
    p.extend_from_slice(&MAX_AMQ.to_be_bytes());
    p.extend_from_slice(&PROPOSED_PDU_SIZE.to_be_bytes());
    build_pdu(ROSCTR_JOB, pdu_ref, &p, &[])
}

/// Returns the negotiated PDU size from a SetupCommunication Ack-Data reply.
pub(crate) fn parse_setup_communication_response(resp: &Response) -> Result<i32, Error> {
    if resp.error_class != 0 || resp.error_code != 0 {
        return Err(Error::S7Error {
            class: resp.error_class,
            code: resp.error_code,
        });
    }
    if resp.params.len() < 8 {
        return Err(Error::ShortBuffer {
            wanted: 8,
            got: resp.params.len(),
        });
    }
    Ok(codec::read_u16(&resp.params[6..8])? as i32)
}

// ---- ReadVar / WriteVar -------------------------------------------------

/// The 3-byte address field is `byte_offset*8 + bit_offset` for every area
/// except COUNTER/TIMER, where the field carries the counter/timer number
/// directly (it is not bit-addressable).
fn item_address_value(tag: &Tag) -> u32 {
    match tag.address.area {
        Area::Counter | Area::Timer => tag.address.byte_offset,
        _ => tag.address.byte_offset * 8 + tag.address.bit_offset as u32,
    }
}

fn build_item_descriptor(tag: &Tag) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12);
    buf.push(SPEC_TYPE_READ_WRITE);
    buf.push(ITEM_LENGTH);
    buf.push(SYNTAX_ID_ANY);
    buf.push(tag.datatype.transport_size());
    buf.extend_from_slice(&tag.datatype.element_count().to_be_bytes());
    let db_number = if tag.address.area.carries_block_number() {
        tag.address.block_number
    } else {
        0
    };
    buf.extend_from_slice(&db_number.to_be_bytes());
    buf.push(tag.address.area.as_u8());
    let addr = item_address_value(tag);
    buf.push(((addr >> 16) & 0xFF) as u8);
    buf.push(((addr >> 8) & 0xFF) as u8);
    buf.push((addr & 0xFF) as u8);
    buf
}

pub(crate) fn build_read_var_request(pdu_ref: u16, tags: &[Tag]) -> Vec<u8> {
    let mut p = Vec::with_capacity(2 + 12 * tags.len());
    p.push(FUNC_READ_VAR);
    p.push(tags.len() as u8);
    for t in tags {
        p.extend_from_slice(&build_item_descriptor(t));
    }
    build_pdu(ROSCTR_JOB, pdu_ref, &p, &[])
}

/// Decodes the per-item ReadVar response data block and fills `value`/`error`
/// on each tag in request order (§4.5). Does not abort on a per-item error.
pub(crate) fn parse_read_var_response(resp: &Response, tags: &mut [Tag]) -> Result<(), Error> {
    let data = resp.data;
    let mut pos = 0usize;
    for (idx, tag) in tags.iter_mut().enumerate() {
        if pos >= data.len() {
            return Err(Error::ProtocolError(format!(
                "ReadVar response truncated before item {}",
                idx
            )));
        }
        let return_code = data[pos];
        if return_code != RETURN_CODE_OK {
            // A failed item still carries the full 4-byte data-item header
            // (return_code, transport_size=0, length=0x0000), no payload.
            // Skipping only the return-code byte would desync every item
            // that follows a non-final failure.
            if data.len() < pos + 4 {
                return Err(Error::ShortBuffer {
                    wanted: pos + 4,
                    got: data.len(),
                });
            }
            tag.set_error(item_return_code_text(return_code).to_string());
            pos += 4;
            if idx + 1 < tags.len() && pos % 2 == 1 {
                pos += 1;
            }
            continue;
        }
        if data.len() < pos + 4 {
            return Err(Error::ShortBuffer {
                wanted: pos + 4,
                got: data.len(),
            });
        }
        let transport_tag = data[pos + 1];
        let wire_len = codec::read_u16(&data[pos + 2..pos + 4])? as usize;
        let payload_len = match transport_tag {
            TS_RES_BIT => 1,
            TS_RES_OCTET => wire_len,
            _ => wire_len / 8,
        };
        let payload_start = pos + 4;
        if data.len() < payload_start + payload_len {
            return Err(Error::ShortBuffer {
                wanted: payload_start + payload_len,
                got: data.len(),
            });
        }
        let payload = &data[payload_start..payload_start + payload_len];
        tag.value = Some(tag.datatype.decode(payload)?);
        tag.error = None;
        pos = payload_start + payload_len;
        if idx + 1 < tags.len() && pos % 2 == 1 {
            pos += 1; // inter-item padding to even length, not after the last item
        }
    }
    Ok(())
}

fn write_var_transport_tag(datatype: S7Type) -> u8 {
    match datatype {
        S7Type::Bit => TS_RES_BIT,
        S7Type::Str { .. } => TS_RES_OCTET,
        _ => TS_RES_BYTE_WORD,
    }
}

pub(crate) fn build_write_var_request(pdu_ref: u16, tags: &[Tag]) -> Result<Vec<u8>, Error> {
    let mut p = Vec::with_capacity(2 + 12 * tags.len());
    p.push(FUNC_WRITE_VAR);
    p.push(tags.len() as u8);
    for t in tags {
        p.extend_from_slice(&build_item_descriptor(t));
    }

    let mut data = Vec::new();
    for (idx, t) in tags.iter().enumerate() {
        let value = t.value.as_ref().ok_or_else(|| {
            Error::ProtocolError(format!("write item {} ({}) has no value to encode", idx, t.name))
        })?;
        let payload = t.datatype.encode(value)?;
        let transport_tag = write_var_transport_tag(t.datatype);
        let wire_len = match transport_tag {
            TS_RES_BIT => 1u16,
            TS_RES_OCTET => payload.len() as u16,
            _ => (payload.len() as u16) * 8,
        };
        data.push(0x00); // reserved / return-code field, unused on write
        data.push(transport_tag);
        data.extend_from_slice(&wire_len.to_be_bytes());
        data.extend_from_slice(&payload);
        if idx + 1 < tags.len() && data.len() % 2 == 1 {
            data.push(0x00);
        }
    }
    Ok(build_pdu(ROSCTR_JOB, pdu_ref, &p, &data))
}

/// WriteVar responses carry one return-code byte per item, in request order.
pub(crate) fn parse_write_var_response(resp: &Response, tags: &mut [Tag]) -> Result<(), Error> {
    if resp.data.len() < tags.len() {
        return Err(Error::ShortBuffer {
            wanted: tags.len(),
            got: resp.data.len(),
        });
    }
    for (tag, &return_code) in tags.iter_mut().zip(resp.data.iter()) {
        if return_code == RETURN_CODE_OK {
            tag.error = None;
        } else {
            tag.set_error(item_return_code_text(return_code).to_string());
        }
    }
    Ok(())
}

// ---- Chunking ------------------------------------------------------------

/// Fixed overhead (S7 header + ReadVar/WriteVar function+count bytes) that
/// counts against the negotiated PDU size alongside the per-item bytes.
pub(crate) const READ_WRITE_FIXED_OVERHEAD: usize = 10 + 2;

/// Greedy packer (§4.5): appends item indices until the next one would
/// overflow `budget`, then starts a new chunk. Preserves input order.
pub(crate) fn chunk_by_budget(item_costs: &[usize], budget: usize) -> Vec<Vec<usize>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut current_total = 0usize;
    for (i, &cost) in item_costs.iter().enumerate() {
        if !current.is_empty() && current_total + cost > budget {
            chunks.push(std::mem::take(&mut current));
            current_total = 0;
        }
        current.push(i);
        current_total += cost;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Per-item cost estimate used for chunking a ReadVar batch: §4.5 governs
/// ReadVar chunking by the response size alone (the per-item request
/// descriptor is fixed-size and cheap; it is the reply that must fit the
/// negotiated PDU), i.e. the 4-byte response item header plus its payload.
pub(crate) fn read_item_cost(tag: &Tag) -> usize {
    4 + tag.size
}

/// Per-item cost estimate for a WriteVar batch: 12-byte descriptor plus the
/// 4-byte data-block header and payload (ignoring padding, which is at most
/// one byte per item and does not change chunk boundaries materially).
pub(crate) fn write_item_cost(tag: &Tag) -> usize {
    12 + 4 + tag.size
}

// ---- UserData (SZL / time) ----------------------------------------------

pub(crate) fn build_userdata_request(
    pdu_ref: u16,
    funcgroup: u8,
    subfunc: u8,
    sequence: u8,
    data: &[u8],
) -> Vec<u8> {
    let mut p = Vec::with_capacity(8);
    p.extend_from_slice(&USERDATA_PARAM_HEAD);
    p.push(USERDATA_PARAM_LENGTH);
    p.push(USERDATA_METHOD_REQUEST);
    p.push((USERDATA_TYPE_REQUEST << 4) | funcgroup);
    p.push(subfunc);
    p.push(sequence);
    build_pdu(ROSCTR_USERDATA, pdu_ref, &p, data)
}

pub(crate) struct UserDataResponse<'a> {
    pub funcgroup: u8,
    pub subfunc: u8,
    pub sequence: u8,
    pub more_follows: bool,
    pub data: &'a [u8],
}

pub(crate) fn parse_userdata_response<'a>(resp: &Response<'a>) -> Result<UserDataResponse<'a>, Error> {
    if resp.params.len() < 8 {
        return Err(Error::ShortBuffer {
            wanted: 8,
            got: resp.params.len(),
        });
    }
    if resp.params[4] != USERDATA_METHOD_RESPONSE {
        return Err(Error::ProtocolError(format!(
            "unexpected userdata method 0x{:02X} (want 0x12)",
            resp.params[4]
        )));
    }
    let funcgroup = resp.params[5] & 0x0F;
    let subfunc = resp.params[6];
    let sequence = resp.params[7];
    let more_follows = resp.params.len() >= 10 && resp.params[9] != 0;
    Ok(UserDataResponse {
        funcgroup,
        subfunc,
        sequence,
        more_follows,
        data: resp.data,
    })
}

// ---- SZL (System Status List) -------------------------------------------

pub(crate) fn build_read_szl_request(pdu_ref: u16, szl_id: u16, szl_index: u16, sequence: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(8);
    data.push(RETURN_CODE_OK);
    data.push(TS_RES_OCTET);
    data.extend_from_slice(&4u16.to_be_bytes());
    data.extend_from_slice(&szl_id.to_be_bytes());
    data.extend_from_slice(&szl_index.to_be_bytes());
    build_userdata_request(pdu_ref, USERDATA_FUNCGROUP_CPU, USERDATA_SUBFUNC_READ_SZL, sequence, &data)
}

pub(crate) struct SzlResponse<'a> {
    pub szl_id: u16,
    pub szl_index: u16,
    pub record_len: usize,
    pub record_count: usize,
    pub records: &'a [u8],
    pub more_follows: bool,
    pub sequence: u8,
}

pub(crate) fn parse_szl_response<'a>(resp: &Response<'a>) -> Result<SzlResponse<'a>, Error> {
    let ud = parse_userdata_response(resp)?;
    if ud.funcgroup != USERDATA_FUNCGROUP_CPU || ud.subfunc != USERDATA_SUBFUNC_READ_SZL {
        return Err(Error::ProtocolError(
            "response is not a read-SZL userdata reply".to_string(),
        ));
    }
    let d = ud.data;
    if d.len() < 12 {
        return Err(Error::ShortBuffer { wanted: 12, got: d.len() });
    }
    if d[0] != RETURN_CODE_OK {
        return Err(Error::ProtocolError(format!(
            "SZL read failed: {}",
            item_return_code_text(d[0])
        )));
    }
    Ok(SzlResponse {
        szl_id: codec::read_u16(&d[4..6])?,
        szl_index: codec::read_u16(&d[6..8])?,
        record_len: codec::read_u16(&d[8..10])? as usize,
        record_count: codec::read_u16(&d[10..12])? as usize,
        records: &d[12..],
        more_follows: ud.more_follows,
        sequence: ud.sequence,
    })
}

// ---- Clock read/write ----------------------------------------------------

pub(crate) fn build_read_clock_request(pdu_ref: u16) -> Vec<u8> {
    let data = vec![RETURN_CODE_OK, TS_RES_OCTET, 0x00, 0x00];
    build_userdata_request(pdu_ref, USERDATA_FUNCGROUP_TIME, USERDATA_SUBFUNC_READ_CLOCK, 0, &data)
}

pub(crate) fn parse_read_clock_response(resp: &Response) -> Result<NaiveDateTime, Error> {
    let ud = parse_userdata_response(resp)?;
    if ud.data.len() < 12 {
        return Err(Error::ShortBuffer {
            wanted: 12,
            got: ud.data.len(),
        });
    }
    if ud.data[0] != RETURN_CODE_OK {
        return Err(Error::ProtocolError(format!(
            "read-clock failed: {}",
            item_return_code_text(ud.data[0])
        )));
    }
    match S7Type::DateTime.decode(&ud.data[4..12])? {
        Value::DateTime(dt) => Ok(dt),
        _ => unreachable!("S7Type::DateTime::decode always returns Value::DateTime"),
    }
}

pub(crate) fn build_set_clock_request(pdu_ref: u16, ts: &NaiveDateTime) -> Result<Vec<u8>, Error> {
    let bcd = S7Type::DateTime.encode(&Value::DateTime(*ts))?;
    let mut data = Vec::with_capacity(4 + bcd.len());
    data.push(RETURN_CODE_OK);
    data.push(TS_RES_OCTET);
    data.extend_from_slice(&(bcd.len() as u16).to_be_bytes());
    data.extend_from_slice(&bcd);
    Ok(build_userdata_request(pdu_ref, USERDATA_FUNCGROUP_TIME, USERDATA_SUBFUNC_SET_CLOCK, 0, &data))
}

// ---- PLC lifecycle (start/stop) -----------------------------------------

pub(crate) fn build_stop_request(pdu_ref: u16) -> Vec<u8> {
    let mut p = Vec::with_capacity(16);
    p.push(FUNC_PLC_STOP);
    p.extend_from_slice(&[0, 0, 0, 0, 0]);
    p.push(P_PROGRAM.len() as u8);
    p.extend_from_slice(P_PROGRAM);
    build_pdu(ROSCTR_JOB, pdu_ref, &p, &[])
}

fn build_start_request(pdu_ref: u16, pi_x: Option<&[u8]>) -> Vec<u8> {
    let mut p = Vec::with_capacity(22);
    p.push(FUNC_PLC_START);
    p.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    p.push(0xFD);
    p.push(0x00);
    if let Some(v) = pi_x {
        p.push(v.len() as u8);
        p.extend_from_slice(v);
    }
    p.push(P_PROGRAM.len() as u8);
    p.extend_from_slice(P_PROGRAM);
    build_pdu(ROSCTR_JOB, pdu_ref, &p, &[])
}

pub(crate) fn build_start_cold_request(pdu_ref: u16) -> Vec<u8> {
    build_start_request(pdu_ref, Some(b"C "))
}

pub(crate) fn build_start_warm_request(pdu_ref: u16) -> Vec<u8> {
    build_start_request(pdu_ref, None)
}

/// Start/Stop succeed iff the reply is an Ack with error-class and
/// error-code both zero (§4.7).
pub(crate) fn lifecycle_succeeded(resp: &Response) -> bool {
    resp.error_class == 0 && resp.error_code == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address;

    fn bool_tag() -> Tag {
        Tag {
            name: "x".to_string(),
            address: address::parse("DB2.DBX0.0").unwrap(),
            datatype: S7Type::Bit,
            value: None,
            size: 1,
            error: None,
        }
    }

    #[test]
    fn read_var_item_descriptor_matches_spec_example() {
        let pdu = build_read_var_request(1, &[bool_tag()]);
        // header(10) + func(1) + count(1) = 12 bytes before the descriptor.
        let descriptor = &pdu[12..24];
        assert_eq!(
            descriptor,
            &[0x12, 0x0A, 0x10, 0x01, 0x00, 0x01, 0x00, 0x02, 0x84, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn parse_read_var_single_bool_ok() {
        let pdu = build_pdu(ROSCTR_ACK_DATA, 1, &[0x04, 0x01], &[0xFF, 0x03, 0x00, 0x01, 0x01]);
        let resp = parse_pdu(&pdu).unwrap();
        let mut tags = vec![bool_tag()];
        parse_read_var_response(&resp, &mut tags).unwrap();
        assert_eq!(tags[0].value, Some(Value::Bit(true)));
        assert!(tags[0].is_ok());
    }

    #[test]
    fn parse_read_var_item_error_does_not_abort_batch() {
        let pdu = build_pdu(
            ROSCTR_ACK_DATA,
            1,
            &[0x04, 0x02],
            &[
                // Item 0: the real 4-byte failed-item header (return_code,
                // transport_size=0, length=0x0000), no payload.
                RETURN_CODE_INVALID_ADDRESS,
                0x00,
                0x00,
                0x00,
                // Item 1: a normal successful BIT read.
                0xFF, 0x03, 0x00, 0x01, 0x01,
            ],
        );
        let resp = parse_pdu(&pdu).unwrap();
        let mut tags = vec![bool_tag(), bool_tag()];
        parse_read_var_response(&resp, &mut tags).unwrap();
        assert!(!tags[0].is_ok());
        assert!(tags[1].is_ok());
        assert_eq!(tags[1].value, Some(Value::Bit(true)));
    }

    #[test]
    fn write_real_encodes_expected_bytes() {
        let tag = Tag {
            name: "r".to_string(),
            address: address::parse("DB2.DBX24.0").unwrap(),
            datatype: S7Type::Real,
            value: Some(Value::Real(6.6)),
            size: 4,
            error: None,
        };
        let pdu = build_write_var_request(2, &[tag]).unwrap();
        // header(10) + func+count(2) + descriptor(12) = 24.
        let data_block = &pdu[24..];
        assert_eq!(data_block[0], 0x00);
        assert_eq!(data_block[1], TS_RES_BYTE_WORD);
        assert_eq!(&data_block[4..8], &[0x40, 0xD3, 0x33, 0x33]);
    }

    #[test]
    fn write_byte_uses_bit_counted_transport_tag() {
        let tag = Tag {
            name: "b".to_string(),
            address: address::parse("DB2.DBX0.0").unwrap(),
            datatype: S7Type::Byte,
            value: Some(Value::Byte(0xAB)),
            size: 1,
            error: None,
        };
        let pdu = build_write_var_request(2, &[tag]).unwrap();
        let data_block = &pdu[24..];
        assert_eq!(data_block[1], TS_RES_BYTE_WORD);
        assert_eq!(&data_block[2..4], &8u16.to_be_bytes());
    }

    #[test]
    fn write_string_still_uses_octet_transport_tag() {
        let tag = Tag {
            name: "s".to_string(),
            address: address::parse("DB2.DBX0.0").unwrap(),
            datatype: S7Type::Str { max_len: 10 },
            value: Some(Value::Str("hi".to_string())),
            size: 12,
            error: None,
        };
        let pdu = build_write_var_request(2, &[tag]).unwrap();
        let data_block = &pdu[24..];
        assert_eq!(data_block[1], TS_RES_OCTET);
    }

    #[test]
    fn chunking_preserves_order_and_splits_when_over_budget() {
        let costs = vec![20usize, 20, 20, 20];
        let chunks = chunk_by_budget(&costs, 45);
        assert_eq!(chunks, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn counter_address_is_not_multiplied_by_eight() {
        let tag = Tag {
            name: "c".to_string(),
            address: address::parse("C5").unwrap(),
            datatype: S7Type::Counter,
            value: None,
            size: 2,
            error: None,
        };
        assert_eq!(item_address_value(&tag), 5);
    }
}
