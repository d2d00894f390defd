// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Transport definition for the S7 session (§4.6).
//!
//! Generalizes the teacher's `Transport` trait (`send`/`pdu_length`/
//! `negotiate`/`connection_type`) to operate on whole S7 PDUs rather than
//! fully pre-built telegrams, delegating TPKT/COTP framing to [`crate::frame`].

use crate::error::Error;

/// An abstract communication channel the session sends S7 PDUs over.
///
/// Implementors own the framing: `send_pdu` wraps `s7_pdu` in COTP data + TPKT
/// headers, writes it, then blocks for one complete framed reply and returns
/// its unwrapped S7 PDU bytes.
pub trait Transport {
    fn send_pdu(&mut self, s7_pdu: &[u8]) -> Result<Vec<u8>, Error>;
    /// Performs the raw TCP connect + COTP connect-request/confirm exchange.
    /// Does not negotiate the S7 PDU size; that is the session's job, built
    /// on top of `send_pdu`.
    fn open(&mut self) -> Result<(), Error>;
    fn close(&mut self) -> Result<(), Error>;
}
