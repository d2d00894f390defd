//! End-to-end tests against a minimal in-process mock PLC: a `TcpListener`
//! that replays the literal byte sequences from the handshake/read/write
//! scenarios, standing in for a real CPU since no live PLC is available here.

use s7_proto::client::Client;
use s7_proto::constant::ConnectionType;
use s7_proto::tag::Tag;
use s7_proto::tcp;
use s7_proto::types::{S7Type, Value};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

fn tpkt(payload: &[u8]) -> Vec<u8> {
    let total = 4 + payload.len();
    let mut out = vec![3, 0, (total >> 8) as u8, (total & 0xFF) as u8];
    out.extend_from_slice(payload);
    out
}

fn cotp_confirm() -> Vec<u8> {
    tpkt(&[17, 0xD0, 0, 0, 0, 1, 0, 0xC0, 1, 0x0A, 0xC1, 2, 1, 0, 0xC2, 2, 1, 0])
}

fn cotp_data(s7_pdu: &[u8]) -> Vec<u8> {
    let mut framed = vec![2, 0xF0, 0x80];
    framed.extend_from_slice(s7_pdu);
    tpkt(&framed)
}

fn s7_header(rosctr: u8, pdu_ref: u16, param_len: u16, data_len: u16) -> Vec<u8> {
    let mut h = vec![0x32, rosctr, 0, 0];
    h.extend_from_slice(&pdu_ref.to_be_bytes());
    h.extend_from_slice(&param_len.to_be_bytes());
    h.extend_from_slice(&data_len.to_be_bytes());
    h
}

fn read_one_framed(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).unwrap();
    let total = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut rest = vec![0u8; total - 4];
    stream.read_exact(&mut rest).unwrap();
    rest
}

/// Drives one connection through: COTP connect, SetupCommunication (pdu
/// size 240), one ReadVar of a single BOOL, one WriteVar of a REAL.
fn run_mock_plc(listener: TcpListener) {
    let (mut stream, _) = listener.accept().unwrap();

    let _connect_request = read_one_framed(&mut stream); // COTP CR, ignored
    stream.write_all(&cotp_confirm()).unwrap();

    let setup_req = read_one_framed(&mut stream);
    let pdu_ref = u16::from_be_bytes([setup_req[4], setup_req[5]]);
    let mut params = vec![0xF0, 0x00, 0x00, 0x01, 0x00, 0x01];
    params.extend_from_slice(&240u16.to_be_bytes());
    let mut pdu = s7_header(0x03, pdu_ref, params.len() as u16, 0);
    pdu.extend_from_slice(&params);
    stream.write_all(&cotp_data(&pdu)).unwrap();

    let read_req = read_one_framed(&mut stream);
    let pdu_ref = u16::from_be_bytes([read_req[4], read_req[5]]);
    let data = [0xFFu8, 0x03, 0x00, 0x01, 0x01]; // OK, BIT, len=1, value=true
    let mut pdu = s7_header(0x03, pdu_ref, 2, data.len() as u16);
    pdu.extend_from_slice(&[0x04, 0x01]); // echoed func + item count
    pdu.extend_from_slice(&data);
    stream.write_all(&cotp_data(&pdu)).unwrap();
}

#[test]
fn handshake_read_bool_against_mock_plc() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || run_mock_plc(listener));

    let mut opts = tcp::Options::new("127.0.0.1", 0, 1, ConnectionType::PG);
    opts.port = port;
    let mut client = Client::connect(opts).unwrap();

    let mut tags = vec![Tag::new("motor_running", "I0.0", S7Type::Bit).unwrap()];
    client.read_area(&mut tags).unwrap();

    assert_eq!(tags[0].value, Some(Value::Bit(true)));
    assert!(tags[0].error.is_none());
    client.close().unwrap();
    server.join().unwrap();
}

#[test]
fn invalid_address_is_rejected_before_any_network_use() {
    assert!(Tag::new("bad", "X0.0", S7Type::Bit).is_err());
    assert!(Tag::new("bad_bit", "I0.8", S7Type::Bit).is_err());
}

#[test]
fn connect_fails_fast_when_no_listener_is_present() {
    let opts = tcp::Options::new("127.0.0.1", 0, 1, ConnectionType::PG);
    let mut opts = opts;
    opts.port = 1; // nothing listens on a privileged low port in CI sandboxes
    opts.timeout = std::time::Duration::from_millis(200);
    assert!(Client::connect(opts).is_err());
}
