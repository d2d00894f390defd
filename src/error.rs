// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Error kinds for the S7 protocol core (§7 of the design).

use std::error;
use std::fmt;
use std::io::{Error as IOError, ErrorKind};

/// Maps a documented Siemens error-class/code pair to a human-readable string.
/// Classes not in this table fall back to a generic description; this is not
/// an exhaustive transcription of every CPU firmware variant's table.
fn s7_error_text(class: u8, code: u8) -> &'static str {
    match (class, code) {
        (0x00, 0x00) => "OK",
        (0x81, 0x01) => "Application relationship: invalid block",
        (0x81, 0x04) => "Application relationship: object does not exist",
        (0x82, 0x04) => "Object definition: object already exists",
        (0x83, 0x01) => "No resources available: hardware fault",
        (0x84, 0x01) => "Error on service processing: invalid parameter",
        (0x84, 0x04) => "Error on service processing: address out of range",
        (0x85, 0x00) => "Error on supplies: no resources",
        (0xD2, 0x01) => "Wrong syntax-ID",
        (0xD2, 0x02) => "Wrong parameter address",
        (0xD2, 0x04) => "Invalid variable address",
        (0xD6, 0x01) => "Invalid block number",
        (0xD6, 0x02) => "Invalid block type",
        _ => "unrecognized S7 error class/code",
    }
}

#[derive(Debug)]
pub enum Error {
    /// TCP/TPKT read or write failed, or the peer closed the connection.
    TransportError(ErrorKind),
    /// Malformed TPKT/COTP/S7 framing: bad protocol-id, truncated field, etc.
    ProtocolError(String),
    /// Unexpected PDU reference or ROSCTR in a response. Fatal: faults the
    /// session.
    ProtocolDesync { expected: u16, got: u16 },
    /// SetupCommunication was rejected or negotiated a PDU size below the
    /// minimum usable size.
    NegotiationError(String),
    /// An operation was invoked before the handshake completed.
    NotConnected,
    /// An address string could not be parsed, or its offsets are out of
    /// range.
    AddressError(String),
    /// A value is outside the legal range for its datatype.
    RangeError(String),
    /// A whole-PDU Ack carried a non-zero error-class/error-code pair.
    S7Error { class: u8, code: u8 },
    /// A buffer was too short for the primitive being read or written.
    ShortBuffer { wanted: usize, got: usize },
    /// A Mutex guarding the transport was poisoned by a panicking holder.
    Lock,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::TransportError(kind) => write!(f, "transport error: {:?}", kind),
            Error::ProtocolError(s) => write!(f, "protocol error: {}", s),
            Error::ProtocolDesync { expected, got } => write!(
                f,
                "protocol desync: expected pdu reference {} got {}",
                expected, got
            ),
            Error::NegotiationError(s) => write!(f, "PDU negotiation error: {}", s),
            Error::NotConnected => write!(f, "operation attempted before handshake completed"),
            Error::AddressError(s) => write!(f, "invalid address: {}", s),
            Error::RangeError(s) => write!(f, "value out of range: {}", s),
            Error::S7Error { class, code } => write!(
                f,
                "S7 error class=0x{:02X} code=0x{:02X}: {}",
                class,
                code,
                s7_error_text(*class, *code)
            ),
            Error::ShortBuffer { wanted, got } => {
                write!(f, "short buffer: wanted {} bytes, got {}", wanted, got)
            }
            Error::Lock => write!(f, "lock error: transport mutex poisoned"),
        }
    }
}

impl From<IOError> for Error {
    fn from(e: IOError) -> Self {
        Error::TransportError(e.kind())
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}

/// Per-item return-code error surfaced on a [`crate::tag::Tag`] by
/// `read_area`/`write_area`. Does not abort the batch and is not an
/// [`Error`] variant in its own right — see §7 propagation policy.
pub(crate) fn item_error_text(return_code: u8) -> String {
    crate::constant::item_return_code_text(return_code).to_string()
}
