//! # RESP Adapter
//!
//! A small TCP server speaking the subset of the Redis serialization
//! protocol needed to use remora from standard Redis clients: `SET`, `GET`,
//! `DEL`, and `EXISTS`, matched case-insensitively. Requests arrive as RESP
//! arrays of bulk strings; replies use `+OK`, `$`-framed bulk strings
//! (`$-1` for nil), and `:n` integers.
//!
//! One thread serves each connection. Responses are buffered and only
//! flushed once no further pipelined request bytes are waiting, which keeps
//! syscall counts low for pipelined clients without adding latency for
//! request/response ones.
//!
//! Framing limits: bulk strings are capped at 8 MiB, arrays at 64 elements,
//! and line-framed payloads at 64 KiB. Protocol violations terminate the
//! connection; key or value sizes outside the cache's bounds get an `-ERR`
//! reply and the connection continues.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use eyre::{bail, ensure, eyre, Result, WrapErr};
use tracing::{debug, info};

use crate::cache::Cache;

const BULK_MAX_LEN: i64 = 8 * 1024 * 1024;
const ARRAY_MAX_LEN: i64 = 64;
const LINE_MAX_LEN: usize = 64 * 1024;

/// One parsed RESP value.
#[derive(Debug, PartialEq, Eq)]
enum Resp {
    Simple(Vec<u8>),
    Error(Vec<u8>),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Resp>>),
}

fn read_line<R: BufRead>(r: &mut R) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    let n = r
        .read_until(b'\n', &mut line)
        .wrap_err("failed to read line")?;
    ensure!(n > 0, "unexpected end of stream");
    ensure!(line.len() <= LINE_MAX_LEN, "line exceeds {} bytes", LINE_MAX_LEN);
    ensure!(
        line.ends_with(b"\r\n"),
        "line not terminated with CRLF"
    );
    line.truncate(line.len() - 2);
    Ok(line)
}

fn read_integer<R: BufRead>(r: &mut R) -> Result<i64> {
    let line = read_line(r)?;
    let text = std::str::from_utf8(&line).wrap_err("integer is not valid UTF-8")?;
    text.parse::<i64>()
        .wrap_err_with(|| format!("invalid integer {:?}", text))
}

/// Reads one RESP message. `Ok(None)` means the stream closed cleanly at a
/// message boundary.
fn read_message<R: BufRead>(r: &mut R) -> Result<Option<Resp>> {
    let mut type_byte = [0u8; 1];
    match r.read_exact(&mut type_byte) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).wrap_err("failed to read frame type"),
    }

    let msg = match type_byte[0] {
        b'+' => Resp::Simple(read_line(r)?),
        b'-' => Resp::Error(read_line(r)?),
        b':' => Resp::Integer(read_integer(r)?),
        b'$' => {
            let len = read_integer(r)?;
            if len < 0 {
                Resp::Bulk(None)
            } else {
                ensure!(len <= BULK_MAX_LEN, "bulk string length {} > max {}", len, BULK_MAX_LEN);
                let mut buf = vec![0u8; len as usize + 2];
                r.read_exact(&mut buf).wrap_err("failed to read bulk string")?;
                ensure!(buf.ends_with(b"\r\n"), "bulk string not terminated with CRLF");
                buf.truncate(len as usize);
                Resp::Bulk(Some(buf))
            }
        }
        b'*' => {
            let len = read_integer(r)?;
            if len < 0 {
                Resp::Array(None)
            } else {
                ensure!(len <= ARRAY_MAX_LEN, "array length {} > max {}", len, ARRAY_MAX_LEN);
                let mut vals = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    let val = read_message(r)?
                        .ok_or_else(|| eyre!("unexpected end of stream inside array"))?;
                    vals.push(val);
                }
                Resp::Array(Some(vals))
            }
        }
        other => bail!("unexpected frame type 0x{:02x}", other),
    };
    Ok(Some(msg))
}

fn write_simple<W: Write>(w: &mut W, msg: &str) -> Result<()> {
    write!(w, "+{}\r\n", msg).wrap_err("failed to write reply")
}

fn write_error<W: Write>(w: &mut W, msg: &str) -> Result<()> {
    write!(w, "-{}\r\n", msg).wrap_err("failed to write reply")
}

fn write_integer<W: Write>(w: &mut W, val: i64) -> Result<()> {
    write!(w, ":{}\r\n", val).wrap_err("failed to write reply")
}

fn write_bulk<W: Write>(w: &mut W, val: Option<&[u8]>) -> Result<()> {
    match val {
        None => w.write_all(b"$-1\r\n").wrap_err("failed to write reply"),
        Some(val) => {
            write!(w, "${}\r\n", val.len()).wrap_err("failed to write reply")?;
            w.write_all(val).wrap_err("failed to write reply")?;
            w.write_all(b"\r\n").wrap_err("failed to write reply")
        }
    }
}

fn bulk_arg<'a>(parts: &'a [Resp], i: usize) -> Result<&'a [u8]> {
    match parts.get(i) {
        Some(Resp::Bulk(Some(bytes))) => Ok(bytes),
        _ => bail!("argument {} is not a bulk string", i),
    }
}

fn key_in_bounds(cache: &Cache, key: &[u8]) -> bool {
    key.len() >= cache.min_key_size() && key.len() <= cache.max_key_size()
}

fn execute<W: Write>(
    cache: &Cache,
    parts: &[Resp],
    w: &mut W,
    val_buf: &mut Vec<u8>,
) -> Result<()> {
    ensure!(!parts.is_empty(), "empty command array");
    let cmd = bulk_arg(parts, 0)?;

    if cmd.eq_ignore_ascii_case(b"set") {
        ensure!(parts.len() >= 3, "SET requires a key and a value");
        let key = bulk_arg(parts, 1)?;
        let val = bulk_arg(parts, 2)?;
        if !key_in_bounds(cache, key) {
            return write_error(w, "ERR key size out of bounds");
        }
        if val.len() < cache.min_val_size() || val.len() > cache.max_val_size() {
            return write_error(w, "ERR value size out of bounds");
        }
        cache.put(key, val);
        write_simple(w, "OK")
    } else if cmd.eq_ignore_ascii_case(b"get") {
        ensure!(parts.len() >= 2, "GET requires a key");
        let key = bulk_arg(parts, 1)?;
        if !key_in_bounds(cache, key) {
            return write_error(w, "ERR key size out of bounds");
        }
        val_buf.clear();
        if cache.get(key, val_buf) {
            write_bulk(w, Some(val_buf))
        } else {
            write_bulk(w, None)
        }
    } else if cmd.eq_ignore_ascii_case(b"del") {
        for i in 1..parts.len() {
            if !key_in_bounds(cache, bulk_arg(parts, i)?) {
                return write_error(w, "ERR key size out of bounds");
            }
        }
        let mut deleted = 0i64;
        for i in 1..parts.len() {
            cache.delete(bulk_arg(parts, i)?);
            deleted += 1;
        }
        write_integer(w, deleted)
    } else if cmd.eq_ignore_ascii_case(b"exists") {
        for i in 1..parts.len() {
            if !key_in_bounds(cache, bulk_arg(parts, i)?) {
                return write_error(w, "ERR key size out of bounds");
            }
        }
        let mut exists = 0i64;
        for i in 1..parts.len() {
            if cache.has(bulk_arg(parts, i)?) {
                exists += 1;
            }
        }
        write_integer(w, exists)
    } else {
        bail!("unsupported command {:?}", String::from_utf8_lossy(cmd));
    }
}

fn serve_connection(cache: &Cache, stream: TcpStream) -> Result<()> {
    let mut reader =
        BufReader::new(stream.try_clone().wrap_err("failed to clone connection")?);
    let mut writer = BufWriter::new(stream);
    let mut val_buf = Vec::new();

    loop {
        let Some(msg) = read_message(&mut reader)? else {
            return Ok(());
        };
        let Resp::Array(Some(parts)) = msg else {
            bail!("request is not an array");
        };
        execute(cache, &parts, &mut writer, &mut val_buf)?;

        // Keep batching replies while further pipelined requests are
        // already buffered.
        if reader.buffer().is_empty() {
            writer.flush().wrap_err("failed to flush responses")?;
        }
    }
}

/// RESP server over a shared cache. One thread per connection.
pub struct RespServer {
    cache: Arc<Cache>,
}

impl RespServer {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    /// Accepts connections until the listener errors.
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr().wrap_err("listener has no local address")?;
        info!(%addr, "resp server listening");

        for stream in listener.incoming() {
            let stream = stream.wrap_err("accept failed")?;
            let cache = Arc::clone(&self.cache);
            thread::spawn(move || {
                let peer = stream.peer_addr().ok();
                if let Err(e) = serve_connection(&cache, stream) {
                    debug!(?peer, error = %e, "connection terminated");
                }
            });
        }
        Ok(())
    }
}
