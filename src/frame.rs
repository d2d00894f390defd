// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Frame Layer (§4.4): TPKT (RFC 1006) framing and COTP (ISO 8073 class 0)
//! connect-request/connect-confirm and data telegrams.
//!
//! Grounded on the teacher's `transport::ISO_CONNECTION_REQUEST_TELEGRAM`
//! and `READ_WRITE_TELEGRAM` byte layouts, generalized from fixed arrays
//! patched in place to builders over an arbitrary S7 PDU payload.

use crate::codec;
use crate::constant::ConnectionType;
use crate::error::Error;

pub(crate) const TPKT_HEADER_LEN: usize = 4;
pub(crate) const COTP_DATA_HEADER_LEN: usize = 3;
pub(crate) const COTP_CONFIRM: u8 = 0xD0;
const COTP_DATA_PDU_TYPE: u8 = 0xF0;
const COTP_DATA_TPDU_NUMBER: u8 = 0x80;
const COTP_CONNECT_REQUEST: u8 = 0xE0;

/// Wraps `payload` in a TPKT header: version=3, reserved=0, length (header +
/// payload) big-endian over 2 bytes.
pub(crate) fn wrap_tpkt(payload: &[u8]) -> Vec<u8> {
    let total = TPKT_HEADER_LEN + payload.len();
    let mut out = Vec::with_capacity(total);
    out.push(3);
    out.push(0);
    out.push((total >> 8) as u8);
    out.push((total & 0xFF) as u8);
    out.extend_from_slice(payload);
    out
}

/// Reads the 4-byte TPKT header and returns the total frame length it
/// declares (header included).
pub(crate) fn read_tpkt_length(header: &[u8; 4]) -> Result<usize, Error> {
    if header[0] != 3 {
        return Err(Error::ProtocolError(format!(
            "unexpected TPKT version {} (want 3)",
            header[0]
        )));
    }
    let length = codec::read_u16(&header[2..])? as usize;
    if length < TPKT_HEADER_LEN {
        return Err(Error::ProtocolError(format!(
            "TPKT length {} is shorter than the header itself",
            length
        )));
    }
    Ok(length)
}

/// Builds the COTP connect-request telegram (with its TPKT header), carrying
/// the TPDU-size, src-TSAP and dst-TSAP parameters (§4.4).
pub(crate) fn connect_request(
    local_tsap: u16,
    conn_type: ConnectionType,
    rack: u16,
    slot: u16,
) -> Vec<u8> {
    let remote_tsap: u16 = ((conn_type as u16) << 8) | (rack * 0x20 + slot);
    let mut cotp = Vec::with_capacity(18);
    cotp.push(17); // length indicator, not counting itself
    cotp.push(COTP_CONNECT_REQUEST);
    cotp.push(0x00); // dst reference hi
    cotp.push(0x00); // dst reference lo
    cotp.push(0x00); // src reference hi
    cotp.push(0x01); // src reference lo
    cotp.push(0x00); // class + options
    cotp.push(0xC0); // TPDU size parameter code
    cotp.push(0x01); // parameter length
    cotp.push(0x0A); // requested TPDU size: 2^10 = 1024
    cotp.push(0xC1); // src TSAP parameter code
    cotp.push(0x02);
    cotp.push((local_tsap >> 8) as u8);
    cotp.push((local_tsap & 0xFF) as u8);
    cotp.push(0xC2); // dst TSAP parameter code
    cotp.push(0x02);
    cotp.push((remote_tsap >> 8) as u8);
    cotp.push((remote_tsap & 0xFF) as u8);
    wrap_tpkt(&cotp)
}

/// Validates a connect-confirm frame (TPKT header already stripped), i.e.
/// that its PDU type is `0xD0`.
pub(crate) fn check_connect_confirm(cotp: &[u8]) -> Result<(), Error> {
    if cotp.len() < 2 {
        return Err(Error::ShortBuffer {
            wanted: 2,
            got: cotp.len(),
        });
    }
    if cotp[1] != COTP_CONFIRM {
        return Err(Error::ProtocolError(format!(
            "expected COTP connect-confirm (0xD0), got 0x{:02X}",
            cotp[1]
        )));
    }
    Ok(())
}

/// Wraps an S7 PDU in the COTP data header (length=2, PDU-type=0xF0,
/// TPDU-number=0x80) and a TPKT header.
pub(crate) fn wrap_data(s7_pdu: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(COTP_DATA_HEADER_LEN + s7_pdu.len());
    framed.push(2);
    framed.push(COTP_DATA_PDU_TYPE);
    framed.push(COTP_DATA_TPDU_NUMBER);
    framed.extend_from_slice(s7_pdu);
    wrap_tpkt(&framed)
}

/// Strips the COTP data header from an already TPKT-destuffed buffer,
/// returning the S7 PDU payload.
pub(crate) fn unwrap_data(buf: &[u8]) -> Result<&[u8], Error> {
    if buf.len() < COTP_DATA_HEADER_LEN {
        return Err(Error::ShortBuffer {
            wanted: COTP_DATA_HEADER_LEN,
            got: buf.len(),
        });
    }
    if buf[1] != COTP_DATA_PDU_TYPE {
        return Err(Error::ProtocolError(format!(
            "expected COTP data PDU-type 0xF0, got 0x{:02X}",
            buf[1]
        )));
    }
    Ok(&buf[COTP_DATA_HEADER_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tpkt_roundtrip_length() {
        let framed = wrap_tpkt(&[1, 2, 3]);
        let mut header = [0u8; 4];
        header.copy_from_slice(&framed[..4]);
        assert_eq!(read_tpkt_length(&header).unwrap(), 7);
    }

    #[test]
    fn rejects_wrong_tpkt_version() {
        let header = [4u8, 0, 0, 7];
        assert!(read_tpkt_length(&header).is_err());
    }

    #[test]
    fn connect_request_encodes_rack_slot() {
        let frame = connect_request(0x0100, ConnectionType::PG, 0, 2);
        // TPKT(4) + COTP header up to dst TSAP value at the tail.
        assert_eq!(frame.len(), 22);
        assert_eq!(frame[frame.len() - 2], 0x01); // conn type PG
        assert_eq!(frame[frame.len() - 1], 0x02); // rack 0, slot 2
    }

    #[test]
    fn data_wrap_unwrap_roundtrip() {
        let pdu = vec![0x32, 0x01, 0x02, 0x03];
        let framed = wrap_data(&pdu);
        let payload = unwrap_data(&framed[4..]).unwrap();
        assert_eq!(payload, pdu.as_slice());
    }

    #[test]
    fn check_connect_confirm_rejects_wrong_type() {
        assert!(check_connect_confirm(&[17, 0xD0]).is_ok());
        assert!(check_connect_confirm(&[17, 0xE0]).is_err());
    }
}
