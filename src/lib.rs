// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! This crate provides communication tools for Siemens S7 family PLCs: a
//! byte codec and typed values for the protocol's ~20 datatypes, symbolic
//! address parsing, TPKT/COTP/S7 framing, and a session state machine with
//! an operation façade on top.
//!
//! # Examples
//! ```no_run
//! # use s7_proto::{client::Client, constant::ConnectionType, tag::Tag, tcp, types::S7Type};
//! # fn main() -> Result<(), s7_proto::error::Error> {
//! let opts = tcp::Options::new("127.0.0.1", 0, 1, ConnectionType::PG);
//! let mut client = Client::connect(opts)?;
//!
//! let mut tags = vec![Tag::new("motor_running", "I0.0", S7Type::Bit)?];
//! client.read_area(&mut tags)?;
//! println!("{:?}", tags[0].value);
//!
//! client.close()?;
//! # Ok(())
//! # }
//! ```
pub mod address;
pub mod client;
pub mod codec;
pub mod constant;
pub mod error;
mod frame;
pub mod message;
pub mod tag;
pub mod tcp;
pub mod transport;
pub mod types;
