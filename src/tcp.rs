// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! TCP transport and Session & State Machine (§4.6).
//!
//! Grounded on the teacher's `tcp::Transport`/`tcp::Options` (connect,
//! timeouts, `set_tsap`, `iso_connect`, `negotiate_pdu_length`), generalized
//! from fixed telegram patching to building PDUs through [`crate::frame`]
//! and [`crate::message`].

use crate::constant::{self, ConnectionType};
use crate::error::Error;
use crate::frame;
use crate::message;
use crate::transport::Transport as TransportTrait;
use log::{debug, trace, warn};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// Default S7 session timeout, applied to both connect and read/write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Session configuration (§6 Configuration options).
#[derive(Debug, Clone)]
pub struct Options {
    pub host: String,
    pub port: u16,
    pub rack: u16,
    pub slot: u16,
    pub connection_type: ConnectionType,
    pub timeout: Duration,
}

impl Options {
    pub fn new(host: impl Into<String>, rack: u16, slot: u16, connection_type: ConnectionType) -> Options {
        Options {
            host: host.into(),
            port: constant::DEFAULT_PORT,
            rack,
            slot,
            connection_type,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Session lifecycle (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    TcpConnected,
    CotpConnected,
    S7Ready,
    Closed,
    Faulted,
}

/// Drives the TPKT/COTP/S7 handshake over one TCP connection and dispatches
/// request/response exchanges on behalf of the operation façade.
///
/// Single-owner discipline (§5): a `Session` is driven by one caller thread;
/// it does not multiplex concurrent operations.
pub struct Session {
    options: Options,
    stream: Option<TcpStream>,
    state: State,
    pdu_size: i32,
    next_pdu_ref: u16,
    local_tsap: u16,
}

impl Session {
    pub fn new(options: Options) -> Session {
        Session {
            options,
            stream: None,
            state: State::Disconnected,
            pdu_size: 0,
            next_pdu_ref: 1,
            local_tsap: 0x0100,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Negotiated PDU size in bytes, 0 before the handshake completes.
    pub fn pdu_size(&self) -> i32 {
        self.pdu_size
    }

    fn take_pdu_ref(&mut self) -> u16 {
        let r = self.next_pdu_ref;
        self.next_pdu_ref = self.next_pdu_ref.wrapping_add(1);
        if self.next_pdu_ref == 0 {
            self.next_pdu_ref = 1;
        }
        r
    }

    fn fault(&mut self, err: Error) -> Error {
        warn!("s7 session faulted: {}", err);
        self.state = State::Faulted;
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        err
    }

    fn write_raw(&mut self, framed: &[u8]) -> Result<(), Error> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        stream.write_all(framed)?;
        Ok(())
    }

    /// Blocks for a complete TPKT-framed message: 4-byte header, then exactly
    /// the remaining bytes its length field declares (§4.4).
    fn read_framed(&mut self) -> Result<Vec<u8>, Error> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        let mut header = [0u8; 4];
        stream.read_exact(&mut header)?;
        let total_len = frame::read_tpkt_length(&header)?;
        let mut rest = vec![0u8; total_len - frame::TPKT_HEADER_LEN];
        stream.read_exact(&mut rest)?;
        let mut full = Vec::with_capacity(total_len);
        full.extend_from_slice(&header);
        full.extend_from_slice(&rest);
        Ok(full)
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        if self.state != State::S7Ready {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    /// Assigns a fresh PDU reference, sends `build(pdu_ref)` and returns the
    /// raw response S7 PDU bytes after verifying the reference echoes back.
    /// Any transport, framing or desync failure faults the session (§4.6,
    /// §7 propagation policy).
    pub(crate) fn request(&mut self, build: impl FnOnce(u16) -> Vec<u8>) -> Result<Vec<u8>, Error> {
        self.ensure_ready()?;
        self.exchange(build)
    }

    /// Like [`Session::request`] but skips the `S7Ready` check, for use
    /// during the handshake itself (SetupCommunication runs while the
    /// session is still `CotpConnected`).
    fn exchange(&mut self, build: impl FnOnce(u16) -> Vec<u8>) -> Result<Vec<u8>, Error> {
        let pdu_ref = self.take_pdu_ref();
        let req = build(pdu_ref);
        trace!("s7 request pdu_ref={} len={}", pdu_ref, req.len());
        let resp = match self.send_pdu(&req) {
            Ok(r) => r,
            Err(e) => return Err(self.fault(e)),
        };
        let got_ref = match message::parse_pdu(&resp) {
            Ok(parsed) => parsed.pdu_ref,
            Err(e) => return Err(self.fault(e)),
        };
        if got_ref != pdu_ref {
            return Err(self.fault(Error::ProtocolDesync {
                expected: pdu_ref,
                got: got_ref,
            }));
        }
        Ok(resp)
    }

    /// Best-effort TCP shutdown; always returns `Ok` per §4.6.
    pub fn close(&mut self) -> Result<(), Error> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.state = State::Closed;
        Ok(())
    }
}

impl TransportTrait for Session {
    fn send_pdu(&mut self, s7_pdu: &[u8]) -> Result<Vec<u8>, Error> {
        let framed = frame::wrap_data(s7_pdu);
        self.write_raw(&framed)?;
        let resp_framed = self.read_framed()?;
        frame::unwrap_data(&resp_framed[frame::TPKT_HEADER_LEN..]).map(|s| s.to_vec())
    }

    fn open(&mut self) -> Result<(), Error> {
        let addr = format!("{}:{}", self.options.host, self.options.port);
        debug!("s7 connecting to {}", addr);
        let stream = TcpStream::connect(&addr)?;
        stream.set_read_timeout(Some(self.options.timeout))?;
        stream.set_write_timeout(Some(self.options.timeout))?;
        self.stream = Some(stream);
        self.state = State::TcpConnected;

        let cr = frame::connect_request(
            self.local_tsap,
            self.options.connection_type,
            self.options.rack,
            self.options.slot,
        );
        if let Err(e) = self.write_raw(&cr) {
            return Err(self.fault(e));
        }
        let cc = match self.read_framed() {
            Ok(cc) => cc,
            Err(e) => return Err(self.fault(e)),
        };
        if let Err(e) = frame::check_connect_confirm(&cc[frame::TPKT_HEADER_LEN..]) {
            return Err(self.fault(e));
        }
        self.state = State::CotpConnected;

        let resp = self.exchange(message::build_setup_communication)?;
        let parsed = match message::parse_pdu(&resp) {
            Ok(p) => p,
            Err(e) => return Err(self.fault(e)),
        };
        let negotiated = match message::parse_setup_communication_response(&parsed) {
            Ok(n) => n,
            Err(e) => return Err(self.fault(e)),
        };
        if negotiated < constant::MIN_NEGOTIATED_PDU_SIZE {
            return Err(self.fault(Error::NegotiationError(format!(
                "negotiated PDU size {} is below the minimum usable size {}",
                negotiated,
                constant::MIN_NEGOTIATED_PDU_SIZE
            ))));
        }
        self.pdu_size = negotiated;
        self.state = State::S7Ready;
        debug!("s7 session ready, pdu_size={}", self.pdu_size);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        Session::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdu_ref_wraps_and_skips_zero() {
        let mut s = Session::new(Options::new("127.0.0.1", 0, 0, ConnectionType::PG));
        s.next_pdu_ref = u16::MAX;
        assert_eq!(s.take_pdu_ref(), u16::MAX);
        assert_eq!(s.take_pdu_ref(), 1);
    }

    #[test]
    fn ensure_ready_rejects_before_handshake() {
        let s = Session::new(Options::new("127.0.0.1", 0, 0, ConnectionType::PG));
        assert!(matches!(s.ensure_ready(), Err(Error::NotConnected)));
    }
}
