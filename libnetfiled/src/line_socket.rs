// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bytes <-> newline-terminated packets, with a "deferred close" mode.
//!
//! Grounded on `libshpool::daemon::server` (socket read-timeout
//! dance, `write_reply` writing straight to a cloned `TcpStream`) and
//! on the contract in spec.md §4.1. Deferred close exists because a
//! worker thread may discover EOF while the connection pool's event
//! loop owns the active-connection map; mutating that map from the
//! worker would race with the loop's own iteration, so the worker only
//! sets a `dirty` flag and the loop reclaims the socket on its next
//! pass.
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context};

const READ_CHUNK: usize = 256;

/// Outcome of one non-blocking `buffer()` call.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` new bytes were appended to the receive buffer.
    Data(usize),
    /// The peer closed the connection (a 0-byte read).
    Eof,
    /// No data was available right now; try again later.
    WouldBlock,
}

pub struct LineSocket {
    stream: TcpStream,
    recv_buf: Vec<u8>,
    /// Set by a worker thread when it observes EOF; cleared only by
    /// the connection pool, which owns removal from the active map.
    dirty: AtomicBool,
    throw_on_close: bool,
}

impl LineSocket {
    pub fn new(stream: TcpStream, throw_on_close: bool) -> anyhow::Result<LineSocket> {
        stream.set_nonblocking(true).context("setting socket nonblocking")?;
        Ok(LineSocket { stream, recv_buf: Vec::new(), dirty: AtomicBool::new(false), throw_on_close })
    }

    pub fn peer_fd(&self) -> i32 {
        use std::os::unix::io::AsRawFd;
        self.stream.as_raw_fd()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Write `bytes` to the stream in full; a short write is treated as
    /// a `NetworkError`-class failure (an `anyhow::Error`, logged by the
    /// caller rather than reported to the client per spec.md §4.11).
    pub fn write(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.stream.write_all(bytes).context("short write to connection")?;
        Ok(())
    }

    pub fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.write(&buf)
    }

    /// Perform one bounded, non-blocking read into the receive buffer.
    pub fn buffer(&mut self) -> anyhow::Result<ReadOutcome> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.stream.read(&mut chunk) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(n) => {
                self.recv_buf.extend_from_slice(&chunk[..n]);
                Ok(ReadOutcome::Data(n))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::WouldBlock),
            Err(e) => Err(e).context("reading from connection"),
        }
    }

    /// If the receive buffer contains a `\n`, extract the bytes up to
    /// (not including) it into `out`, advance the buffer past the
    /// `\n`, and return true. Never blocks.
    pub fn get_line(&mut self, out: &mut String) -> bool {
        if let Some(idx) = self.recv_buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.recv_buf.drain(..=idx).collect();
            let line = &line_bytes[..line_bytes.len() - 1];
            out.push_str(&String::from_utf8_lossy(line));
            true
        } else {
            false
        }
    }

    /// Block-read one full line by looping `buffer()`/`get_line()`.
    /// Used only by the bundled test client, which does not need the
    /// event-loop's non-blocking discipline.
    pub fn read_line_blocking(&mut self) -> anyhow::Result<Option<String>> {
        let mut out = String::new();
        loop {
            if self.get_line(&mut out) {
                return Ok(Some(out));
            }
            match self.buffer()? {
                ReadOutcome::Eof => return Ok(None),
                ReadOutcome::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                ReadOutcome::Data(_) => {}
            }
        }
    }

    /// In deferred-close mode, just mark the socket dirty; the pool
    /// reclaims it on its next iteration. In throw-on-close mode,
    /// close the fd immediately and fail.
    pub fn close(&mut self) -> anyhow::Result<()> {
        if self.throw_on_close {
            self.stream.shutdown(std::net::Shutdown::Both).context("closing stream")?;
            return Err(anyhow!("connection closed by remote"));
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn try_clone(&self) -> anyhow::Result<TcpStream> {
        self.stream.try_clone().context("cloning connection handle")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::TcpListener;

    fn pair() -> (LineSocket, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (LineSocket::new(server, false).unwrap(), client)
    }

    #[test]
    fn extracts_one_line_at_a_time() {
        let (mut sock, mut client) = pair();
        client.write_all(b"first\nsecond\n").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        loop {
            match sock.buffer().unwrap() {
                ReadOutcome::Eof | ReadOutcome::WouldBlock => break,
                ReadOutcome::Data(_) => {}
            }
        }
        let mut out = String::new();
        assert!(sock.get_line(&mut out));
        assert_eq!(out, "first");
        let mut out2 = String::new();
        assert!(sock.get_line(&mut out2));
        assert_eq!(out2, "second");
        let mut out3 = String::new();
        assert!(!sock.get_line(&mut out3));
    }

    #[test]
    fn deferred_close_only_marks_dirty() {
        let (mut sock, _client) = pair();
        sock.close().unwrap();
        assert!(sock.is_dirty());
    }
}
