//! # RESP Server Integration Tests
//!
//! Drives the RESP adapter over a real TCP socket: command round-trips,
//! pipelining, and error replies for out-of-bounds keys.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use remora::{constant_memory, Cache, RespServer};

fn start_server() -> TcpStream {
    let cache = Cache::builder()
        .table_size(64 * 1024)
        .max_key_size(64)
        .max_val_size(1024)
        .mem_func(constant_memory(8 * 64 * 1024))
        .watcher_interval(Duration::from_secs(3600))
        .open()
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = RespServer::new(Arc::new(cache));
    std::thread::spawn(move || {
        let _ = server.serve(listener);
    });

    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

/// Reads one RESP reply (enough of the grammar for these tests).
fn read_reply(r: &mut BufReader<TcpStream>) -> Vec<u8> {
    let mut line = Vec::new();
    r.read_until(b'\n', &mut line).unwrap();
    if line.starts_with(b"$") {
        let len: i64 = std::str::from_utf8(&line[1..line.len() - 2])
            .unwrap()
            .parse()
            .unwrap();
        if len >= 0 {
            let mut body = vec![0u8; len as usize + 2];
            r.read_exact(&mut body).unwrap();
            line.extend_from_slice(&body);
        }
    }
    line
}

#[test]
fn set_get_del_exists_roundtrip() {
    let stream = start_server();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;

    writer
        .write_all(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$5\r\nhello\r\n")
        .unwrap();
    assert_eq!(read_reply(&mut reader), b"+OK\r\n");

    writer
        .write_all(b"*2\r\n$3\r\nget\r\n$3\r\nfoo\r\n")
        .unwrap();
    assert_eq!(read_reply(&mut reader), b"$5\r\nhello\r\n");

    writer
        .write_all(b"*3\r\n$6\r\nexists\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
        .unwrap();
    assert_eq!(read_reply(&mut reader), b":1\r\n");

    writer
        .write_all(b"*2\r\n$3\r\nDEL\r\n$3\r\nfoo\r\n")
        .unwrap();
    assert_eq!(read_reply(&mut reader), b":1\r\n");

    writer
        .write_all(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
        .unwrap();
    assert_eq!(read_reply(&mut reader), b"$-1\r\n");
}

#[test]
fn pipelined_commands_all_answered() {
    let stream = start_server();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;

    writer
        .write_all(
            b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
              *3\r\n$3\r\nSET\r\n$1\r\nb\r\n$1\r\n2\r\n\
              *2\r\n$3\r\nGET\r\n$1\r\na\r\n",
        )
        .unwrap();

    assert_eq!(read_reply(&mut reader), b"+OK\r\n");
    assert_eq!(read_reply(&mut reader), b"+OK\r\n");
    assert_eq!(read_reply(&mut reader), b"$1\r\n1\r\n");
}

#[test]
fn oversized_key_gets_error_reply() {
    let stream = start_server();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;

    let key = [b'k'; 65];
    let mut request = format!("*3\r\n$3\r\nSET\r\n${}\r\n", key.len()).into_bytes();
    request.extend_from_slice(&key);
    request.extend_from_slice(b"\r\n$1\r\nv\r\n");
    writer.write_all(&request).unwrap();

    let reply = read_reply(&mut reader);
    assert!(reply.starts_with(b"-ERR"), "reply: {:?}", reply);

    // The connection is still usable afterwards.
    writer
        .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n")
        .unwrap();
    assert_eq!(read_reply(&mut reader), b"+OK\r\n");
}
