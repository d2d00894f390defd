// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Wire-level constants for the S7 protocol: memory area codes, transport-size
//! tags, function codes and SZL identifiers used by the message and client
//! layers.

/// S7 memory area codes (§3 Address data model).
///
/// Only `DataBlocks`/`InstanceDb` may carry a non-zero block number; every
/// other area's block number is forced to zero during address parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// Process image of inputs (German: Eingänge).
    Inputs = 0x81,
    /// Process image of outputs (German: Ausgänge).
    Outputs = 0x82,
    /// Flags / merkers.
    Flags = 0x83,
    /// Data block (German: Datenbausteine).
    DataBlocks = 0x84,
    /// Instance data block.
    InstanceDb = 0x85,
    Counter = 0x1C,
    Timer = 0x1D,
}

impl Area {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(v: u8) -> Option<Area> {
        match v {
            0x81 => Some(Area::Inputs),
            0x82 => Some(Area::Outputs),
            0x83 => Some(Area::Flags),
            0x84 => Some(Area::DataBlocks),
            0x85 => Some(Area::InstanceDb),
            0x1C => Some(Area::Counter),
            0x1D => Some(Area::Timer),
            _ => None,
        }
    }

    /// whether this area may carry a non-zero block number (DB/DI only).
    pub(crate) fn carries_block_number(self) -> bool {
        matches!(self, Area::DataBlocks | Area::InstanceDb)
    }
}

// ROSCTR (S7 message header "rosctr" field)
pub(crate) const ROSCTR_JOB: u8 = 0x01;
pub(crate) const ROSCTR_ACK: u8 = 0x02;
pub(crate) const ROSCTR_ACK_DATA: u8 = 0x03;
pub(crate) const ROSCTR_USERDATA: u8 = 0x07;

// Function codes (job requests)
pub(crate) const FUNC_READ_VAR: u8 = 0x04;
pub(crate) const FUNC_WRITE_VAR: u8 = 0x05;
#[allow(dead_code)]
pub(crate) const FUNC_REQUEST_DOWNLOAD: u8 = 0x1A;
#[allow(dead_code)]
pub(crate) const FUNC_DOWNLOAD_BLOCK: u8 = 0x1B;
pub(crate) const FUNC_PLC_START: u8 = 0x28;
pub(crate) const FUNC_PLC_STOP: u8 = 0x29;
pub(crate) const FUNC_SETUP_COMMUNICATION: u8 = 0xF0;

// ReadVar/WriteVar "any" item descriptor constants
pub(crate) const SPEC_TYPE_READ_WRITE: u8 = 0x12;
pub(crate) const ITEM_LENGTH: u8 = 0x0A;
pub(crate) const SYNTAX_ID_ANY: u8 = 0x10;

// WriteVar per-item data-block transport-size tags (return codes on read)
pub(crate) const TS_RES_BIT: u8 = 0x03;
pub(crate) const TS_RES_BYTE_WORD: u8 = 0x04;
pub(crate) const TS_RES_OCTET: u8 = 0x09;

/// Item return codes from ReadVar/WriteVar responses.
pub(crate) const RETURN_CODE_OK: u8 = 0xFF;
pub(crate) const RETURN_CODE_HW_FAULT: u8 = 0x01;
pub(crate) const RETURN_CODE_ACCESS_DENIED: u8 = 0x03;
pub(crate) const RETURN_CODE_INVALID_ADDRESS: u8 = 0x05;
pub(crate) const RETURN_CODE_DATA_TYPE_NOT_SUPPORTED: u8 = 0x06;
pub(crate) const RETURN_CODE_OBJECT_NOT_AVAILABLE: u8 = 0x0A;

pub(crate) fn item_return_code_text(code: u8) -> &'static str {
    match code {
        RETURN_CODE_OK => "OK",
        RETURN_CODE_HW_FAULT => "hardware fault",
        RETURN_CODE_ACCESS_DENIED => "access denied",
        RETURN_CODE_INVALID_ADDRESS => "invalid address",
        RETURN_CODE_DATA_TYPE_NOT_SUPPORTED => "data type not supported",
        RETURN_CODE_OBJECT_NOT_AVAILABLE => "object not available",
        _ => "unknown item error",
    }
}

// UserData parameter head, grouped by function group.
pub(crate) const USERDATA_PARAM_HEAD: [u8; 3] = [0x00, 0x01, 0x12];
pub(crate) const USERDATA_PARAM_LENGTH: u8 = 0x04;

pub(crate) const USERDATA_METHOD_REQUEST: u8 = 0x11;
pub(crate) const USERDATA_METHOD_RESPONSE: u8 = 0x12;

/// High nibble of the UserData "type + function group" byte.
pub(crate) const USERDATA_TYPE_REQUEST: u8 = 0x4;
pub(crate) const USERDATA_TYPE_RESPONSE: u8 = 0x8;

pub(crate) const USERDATA_FUNCGROUP_CPU: u8 = 0x4;
pub(crate) const USERDATA_FUNCGROUP_BLOCK: u8 = 0x2;
pub(crate) const USERDATA_FUNCGROUP_TIME: u8 = 0x7;

pub(crate) const USERDATA_SUBFUNC_READ_SZL: u8 = 0x01;
pub(crate) const USERDATA_SUBFUNC_READ_CLOCK: u8 = 0x01;
pub(crate) const USERDATA_SUBFUNC_SET_CLOCK: u8 = 0x02;
pub(crate) const USERDATA_SUBFUNC_BLOCK_INFO: u8 = 0x03;

/// Block-type codes used in `read_block_info` requests (ASCII digit/letter
/// codes the CPU firmware expects, shared across SIMATIC tooling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Ob = 0x38,
    Db = 0x41,
    Sdb = 0x42,
    Fc = 0x43,
    Sfc = 0x44,
    Fb = 0x45,
    Sfb = 0x46,
}

/// SZL IDs consumed by the operation façade (§4.7).
pub(crate) const SZL_ID_CPU_STATUS: u16 = 0x0424;
pub(crate) const SZL_ID_CATALOG_CODE: u16 = 0x0011;
pub(crate) const SZL_ID_CPU_INFO: u16 = 0x001C;
pub(crate) const SZL_ID_COMM_PROC: u16 = 0x0131;
pub(crate) const SZL_ID_PROTECTION: u16 = 0x0232;
pub(crate) const SZL_ID_CPU_DIAGNOSTICS: u16 = 0x00A0;
pub(crate) const SZL_ID_CPU_LEDS: u16 = 0x0074;

pub(crate) const SZL_INDEX_COMM_PROC: u16 = 0x0001;
pub(crate) const SZL_INDEX_PROTECTION: u16 = 0x0004;
pub(crate) const SZL_INDEX_DEFAULT: u16 = 0x0000;

/// COTP connection type (destination TSAP high byte), §6 configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// Programmiergeräte - programming console.
    PG = 0x01,
    /// Operator panel / HMI.
    OP = 0x02,
    /// Generic S7Basic connection.
    S7Basic = 0x03,
}

pub(crate) const DEFAULT_PORT: u16 = 102;
pub(crate) const MIN_NEGOTIATED_PDU_SIZE: i32 = 240;
pub(crate) const PROPOSED_PDU_SIZE: u16 = 0x03C0; // 960
pub(crate) const MAX_AMQ: u16 = 0x0001;
