// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Operation Façade (§4.7): the public operations a caller drives a
//! [`Client`] through. Each one builds a function-specific parameter/data
//! block, posts it through [`Session::request`], and decodes the reply into
//! the record shapes listed in §4.7's table.
//!
//! SZL-record field offsets for the diagnostic operations are grounded on
//! the fork `PecTify-s7::client`'s `cp_info`/`cpu_info`/`plc_status`/
//! `get_ag_block_info`, adapted into owned record types instead of the
//! fork's in-place buffer mutation.

use crate::codec;
use crate::constant::{self, BlockType};
use crate::error::Error;
use crate::message;
use crate::tag::Tag;
use crate::tcp::{Options, Session, State};
use chrono::NaiveDateTime;

/// A connected S7 session plus the operation façade over it.
pub struct Client {
    session: Session,
}

impl Client {
    /// Opens a TCP connection and drives it through the TPKT/COTP/S7
    /// handshake (§4.6). Returns once the session is `S7Ready`.
    pub fn connect(options: Options) -> Result<Client, Error> {
        let mut session = Session::new(options);
        session.open()?;
        Ok(Client { session })
    }

    pub fn state(&self) -> State {
        self.session.state()
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.session.close()
    }

    // ---- read_area / write_area ---------------------------------------

    /// Reads every tag's value, chunking the batch across multiple ReadVar
    /// PDUs if it would exceed the negotiated PDU size (§4.5). Per-item
    /// failures populate `tag.error` without aborting the batch.
    pub fn read_area(&mut self, tags: &mut [Tag]) -> Result<(), Error> {
        let budget = self.item_budget();
        let costs: Vec<usize> = tags.iter().map(message::read_item_cost).collect();
        for chunk in message::chunk_by_budget(&costs, budget) {
            let mut slice: Vec<Tag> = chunk.iter().map(|&i| tags[i].clone()).collect();
            let resp = self.session.request(|pdu_ref| message::build_read_var_request(pdu_ref, &slice))?;
            let parsed = message::parse_pdu(&resp)?;
            message::parse_read_var_response(&parsed, &mut slice)?;
            for (slot, &i) in chunk.iter().enumerate() {
                tags[i].value = slice[slot].value.clone();
                tags[i].error = slice[slot].error.clone();
            }
        }
        Ok(())
    }

    /// Writes every tag's value, chunking as in `read_area`.
    pub fn write_area(&mut self, tags: &mut [Tag]) -> Result<(), Error> {
        let budget = self.item_budget();
        let costs: Vec<usize> = tags.iter().map(message::write_item_cost).collect();
        for chunk in message::chunk_by_budget(&costs, budget) {
            let mut slice: Vec<Tag> = chunk.iter().map(|&i| tags[i].clone()).collect();
            // Validate every value encodes before spending a PDU reference:
            // `build_write_var_request` is a pure function of `slice`, so a
            // dry run with a throwaway reference guarantees the real one
            // (inside `request`, where the live reference is assigned) cannot fail.
            message::build_write_var_request(0, &slice)?;
            let resp = self
                .session
                .request(|pdu_ref| message::build_write_var_request(pdu_ref, &slice).unwrap_or_default())?;
            let parsed = message::parse_pdu(&resp)?;
            message::parse_write_var_response(&parsed, &mut slice)?;
            for (slot, &i) in chunk.iter().enumerate() {
                tags[i].error = slice[slot].error.clone();
            }
        }
        Ok(())
    }

    fn item_budget(&self) -> usize {
        (self.session.pdu_size() as usize).saturating_sub(message::READ_WRITE_FIXED_OVERHEAD)
    }

    // ---- time ------------------------------------------------------------

    pub fn read_plc_time(&mut self) -> Result<NaiveDateTime, Error> {
        let resp = self.session.request(message::build_read_clock_request)?;
        let parsed = message::parse_pdu(&resp)?;
        message::parse_read_clock_response(&parsed)
    }

    /// Writes `ts` to the PLC clock, returning it back on success.
    pub fn set_plc_time(&mut self, ts: NaiveDateTime) -> Result<NaiveDateTime, Error> {
        message::build_set_clock_request(0, &ts)?; // validate before spending a PDU reference
        let resp = self
            .session
            .request(|pdu_ref| message::build_set_clock_request(pdu_ref, &ts).unwrap_or_default())?;
        let parsed = message::parse_pdu(&resp)?;
        if parsed.error_class != 0 || parsed.error_code != 0 {
            return Err(Error::S7Error {
                class: parsed.error_class,
                code: parsed.error_code,
            });
        }
        Ok(ts)
    }

    /// Sets the PLC clock to the caller's local or UTC wall-clock time and
    /// returns the timestamp that was sent (§4.7).
    pub fn sync_plc_time(&mut self, utc: bool) -> Result<NaiveDateTime, Error> {
        let now = if utc {
            chrono::Utc::now().naive_utc()
        } else {
            chrono::Local::now().naive_local()
        };
        self.set_plc_time(now)
    }

    // ---- lifecycle ---------------------------------------------------------

    pub fn stop(&mut self) -> Result<bool, Error> {
        let resp = self.session.request(message::build_stop_request)?;
        let parsed = message::parse_pdu(&resp)?;
        Ok(message::lifecycle_succeeded(&parsed))
    }

    pub fn start_plc_cold(&mut self) -> Result<bool, Error> {
        let resp = self.session.request(message::build_start_cold_request)?;
        let parsed = message::parse_pdu(&resp)?;
        Ok(message::lifecycle_succeeded(&parsed))
    }

    pub fn start_plc_hot(&mut self) -> Result<bool, Error> {
        let resp = self.session.request(message::build_start_warm_request)?;
        let parsed = message::parse_pdu(&resp)?;
        Ok(message::lifecycle_succeeded(&parsed))
    }

    // ---- SZL ---------------------------------------------------------------

    /// Reads one SZL record (`id`/`index`), transparently paginating
    /// multi-part responses via `more_follows`/`sequence` (§4.5 UserData),
    /// and returns the concatenated raw record bytes.
    pub fn read_szl(&mut self, id: u16, index: u16) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        let mut sequence = 0u8;
        loop {
            let resp = self
                .session
                .request(|pdu_ref| message::build_read_szl_request(pdu_ref, id, index, sequence))?;
            let parsed = message::parse_pdu(&resp)?;
            let szl = message::parse_szl_response(&parsed)?;
            out.extend_from_slice(szl.records);
            if !szl.more_follows {
                break;
            }
            sequence = szl.sequence;
        }
        Ok(out)
    }

    pub fn read_cpu_status(&mut self) -> Result<CpuStatus, Error> {
        match self.read_szl(constant::SZL_ID_CPU_STATUS, constant::SZL_INDEX_DEFAULT) {
            Ok(data) if data.len() >= 4 => Ok(CpuStatus {
                requested_mode: data[2],
                previous_mode: data[3],
                error: None,
            }),
            Ok(_) => Ok(CpuStatus {
                requested_mode: 0,
                previous_mode: 0,
                error: Some("SZL record too short to decode CPU status".to_string()),
            }),
            Err(e) => Ok(CpuStatus {
                requested_mode: 0,
                previous_mode: 0,
                error: Some(e.to_string()),
            }),
        }
    }

    pub fn read_catalog_code(&mut self) -> Result<CatalogCode, Error> {
        let data = self.read_szl(constant::SZL_ID_CATALOG_CODE, constant::SZL_INDEX_DEFAULT)?;
        if data.len() < 28 {
            return Ok(CatalogCode::with_error("SZL 0x0011 record too short"));
        }
        Ok(CatalogCode {
            module_order_no: codec::read_fixed_ascii(&data[2..22], 20, true)?,
            module_version: data[22],
            hw_id: codec::read_u16(&data[23..25])?,
            hw_version: data[25],
            fw_id: codec::read_u16(&data[26..28])?,
            fw_version: *data.get(28).unwrap_or(&0),
            fw_ext_id: *data.get(29).unwrap_or(&0),
            fw_ext_version: *data.get(30).unwrap_or(&0),
            error: None,
        })
    }

    pub fn read_cpu_info(&mut self) -> Result<CpuInfo, Error> {
        let data = self.read_szl(constant::SZL_ID_CPU_INFO, constant::SZL_INDEX_DEFAULT)?;
        const FIELD_LEN: usize = 32;
        let field = |n: usize| -> Result<String, Error> {
            let start = 2 + n * FIELD_LEN;
            if data.len() < start + FIELD_LEN {
                return Ok(String::new());
            }
            codec::read_fixed_ascii(&data[start..start + FIELD_LEN], FIELD_LEN, true)
        };
        Ok(CpuInfo {
            module_type_name: field(0)?,
            serial_number: field(1)?,
            plant_id: field(2)?,
            copyright: field(3)?,
            module_name: field(4)?,
            location: field(5)?,
            module_order_no: field(6)?,
            hw_version: field(7)?,
            fw_version: field(8)?,
            firmware_date: field(9)?,
            oem_id: field(10)?,
            oem_copyright: field(11)?,
            serviceable_module_order_no: field(12)?,
            error: None,
        })
    }

    pub fn read_comm_proc(&mut self) -> Result<Vec<CommProc>, Error> {
        let data = self.read_szl(constant::SZL_ID_COMM_PROC, constant::SZL_INDEX_COMM_PROC)?;
        decode_records(&data, 8, |r| CommProc {
            max_pdu: codec::read_u16(&r[0..2]).unwrap_or(0),
            max_conn: codec::read_u16(&r[2..4]).unwrap_or(0),
            mpi_rate: codec::read_u16(&r[4..6]).unwrap_or(0),
            mkbus_rate: codec::read_u16(&r[6..8]).unwrap_or(0),
            error: None,
        })
    }

    pub fn read_protection(&mut self) -> Result<Vec<Protection>, Error> {
        let data = self.read_szl(constant::SZL_ID_PROTECTION, constant::SZL_INDEX_PROTECTION)?;
        decode_records(&data, 10, |r| Protection {
            protection_level: codec::read_u16(&r[0..2]).unwrap_or(0),
            password_level: codec::read_u16(&r[2..4]).unwrap_or(0),
            valid_protection_level: codec::read_u16(&r[4..6]).unwrap_or(0),
            mode_selector: codec::read_u16(&r[6..8]).unwrap_or(0),
            startup_switch: codec::read_u16(&r[8..10]).unwrap_or(0),
            error: None,
        })
    }

    pub fn read_cpu_diagnostics(&mut self) -> Result<Vec<CpuDiagnosticEvent>, Error> {
        let data = self.read_szl(constant::SZL_ID_CPU_DIAGNOSTICS, constant::SZL_INDEX_DEFAULT)?;
        decode_records(&data, 20, |r| CpuDiagnosticEvent {
            event_id: codec::read_u16(&r[0..2]).unwrap_or(0),
            priority: r[2],
            ob_number: r[3],
            dat_id: r[4],
            info1: codec::read_u16(&r[5..7]).unwrap_or(0),
            info2: codec::read_u32(&r[7..11]).unwrap_or(0),
            timestamp: r[11..19].to_vec(),
            // No firmware-independent event-id -> text catalogue is available
            // (see DESIGN.md Open Questions); surface the id itself rather
            // than an empty string so the field still carries information.
            description: format!("event 0x{:04X}", codec::read_u16(&r[0..2]).unwrap_or(0)),
            error: None,
        })
    }

    pub fn read_cpu_leds(&mut self) -> Result<Vec<CpuLed>, Error> {
        let data = self.read_szl(constant::SZL_ID_CPU_LEDS, constant::SZL_INDEX_DEFAULT)?;
        decode_records(&data, 4, |r| CpuLed {
            rack: r[0],
            led_type: r[1],
            id: r[2],
            on: r[3] & 0x01 != 0,
            flashing: r[3] & 0x02 != 0,
            error: None,
        })
    }

    // ---- block info ---------------------------------------------------------

    pub fn read_block_info(&mut self, block_type: BlockType, number: u16) -> Result<BlockInfo, Error> {
        let mut data = Vec::with_capacity(8);
        data.push(RETURN_CODE_PLACEHOLDER);
        data.push(0x09);
        data.extend_from_slice(&7u16.to_be_bytes());
        data.push(block_type as u8);
        data.extend_from_slice(format!("{:05}", number).as_bytes());
        data.push(b'A');

        let resp = self
            .session
            .request(|pdu_ref| message::build_userdata_request(pdu_ref, constant::USERDATA_FUNCGROUP_BLOCK, constant::USERDATA_SUBFUNC_BLOCK_INFO, 0, &data))?;
        let parsed = message::parse_pdu(&resp)?;
        let ud = message::parse_userdata_response(&parsed)?;
        if ud.data.len() < 4 || ud.data[0] != RETURN_CODE_PLACEHOLDER {
            return Ok(BlockInfo::with_error("block-info response missing or rejected"));
        }
        let record = &ud.data[4..];
        if record.len() < 61 {
            return Ok(BlockInfo::with_error("block-info record shorter than expected"));
        }
        Ok(BlockInfo {
            block_type: record[2],
            block_number: codec::read_u16(&record[3..5])?,
            load_memory_size: codec::read_u32(&record[5..9])?,
            security_level: codec::read_u32(&record[9..13])?,
            ssb_length: codec::read_u16(&record[25..27])?,
            add_length: codec::read_u16(&record[27..29])?,
            local_data_size: codec::read_u16(&record[29..31])?,
            mc7_code_length: codec::read_u16(&record[31..33])?,
            author: codec::read_fixed_ascii(&record[33..41], 8, true)?,
            family: codec::read_fixed_ascii(&record[41..49], 8, true)?,
            header_name: codec::read_fixed_ascii(&record[49..57], 8, true)?,
            checksum: codec::read_u16(&record[59..61])?,
            error: None,
        })
    }
}

// Also doubles as the success return code on the way back (0xFF, §4.5).
const RETURN_CODE_PLACEHOLDER: u8 = 0xFF;

fn decode_records<T>(data: &[u8], record_len: usize, decode_one: impl Fn(&[u8]) -> T) -> Result<Vec<T>, Error> {
    Ok(data.chunks_exact(record_len).map(decode_one).collect())
}

/// `read_cpu_status` (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuStatus {
    pub requested_mode: u8,
    pub previous_mode: u8,
    pub error: Option<String>,
}

/// `read_catalog_code` (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCode {
    pub module_order_no: String,
    pub module_version: u8,
    pub hw_id: u16,
    pub hw_version: u8,
    pub fw_id: u16,
    pub fw_version: u8,
    pub fw_ext_id: u8,
    pub fw_ext_version: u8,
    pub error: Option<String>,
}

impl CatalogCode {
    fn with_error(msg: &str) -> CatalogCode {
        CatalogCode {
            module_order_no: String::new(),
            module_version: 0,
            hw_id: 0,
            hw_version: 0,
            fw_id: 0,
            fw_version: 0,
            fw_ext_id: 0,
            fw_ext_version: 0,
            error: Some(msg.to_string()),
        }
    }
}

/// `read_cpu_info`: identity strings from SZL 0x001C. §README counts 14
/// fields; only 13 are backed by a confirmed fixed-offset ASCII field in the
/// record (see DESIGN.md Open Questions) — the 14th is not reproduced here
/// rather than guessed at an unverified offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuInfo {
    pub module_type_name: String,
    pub serial_number: String,
    pub plant_id: String,
    pub copyright: String,
    pub module_name: String,
    pub location: String,
    pub module_order_no: String,
    pub hw_version: String,
    pub fw_version: String,
    pub firmware_date: String,
    pub oem_id: String,
    pub oem_copyright: String,
    pub serviceable_module_order_no: String,
    pub error: Option<String>,
}

/// One `read_comm_proc` entry (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommProc {
    pub max_pdu: u16,
    pub max_conn: u16,
    pub mpi_rate: u16,
    pub mkbus_rate: u16,
    pub error: Option<&'static str>,
}

/// One `read_protection` entry (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protection {
    pub protection_level: u16,
    pub password_level: u16,
    pub valid_protection_level: u16,
    pub mode_selector: u16,
    pub startup_switch: u16,
    pub error: Option<&'static str>,
}

/// One `read_cpu_diagnostics` entry (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuDiagnosticEvent {
    pub event_id: u16,
    pub priority: u8,
    pub ob_number: u8,
    pub dat_id: u8,
    pub info1: u16,
    pub info2: u32,
    pub timestamp: Vec<u8>,
    pub description: String,
    pub error: Option<String>,
}

/// One `read_cpu_leds` entry (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuLed {
    pub rack: u8,
    pub led_type: u8,
    pub id: u8,
    pub on: bool,
    pub flashing: bool,
    pub error: Option<&'static str>,
}

/// `read_block_info` result (§4.7, §README).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub block_type: u8,
    pub block_number: u16,
    pub load_memory_size: u32,
    pub security_level: u32,
    pub ssb_length: u16,
    pub add_length: u16,
    pub local_data_size: u16,
    pub mc7_code_length: u16,
    pub author: String,
    pub family: String,
    pub header_name: String,
    pub checksum: u16,
    pub error: Option<String>,
}

impl BlockInfo {
    fn with_error(msg: &str) -> BlockInfo {
        BlockInfo {
            block_type: 0,
            block_number: 0,
            load_memory_size: 0,
            security_level: 0,
            ssb_length: 0,
            add_length: 0,
            local_data_size: 0,
            mc7_code_length: 0,
            author: String::new(),
            family: String::new(),
            header_name: String::new(),
            checksum: 0,
            error: Some(msg.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_records_splits_fixed_width_rows() {
        let data = vec![1, 0, 2, 0, 3, 0, 4, 0];
        let rows = decode_records(&data, 2, |r| codec::read_u16(r).unwrap()).unwrap();
        assert_eq!(rows, vec![256, 512, 768, 1024]);
    }
}
