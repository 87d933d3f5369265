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

//! The connection pool: a single-threaded event loop that demultiplexes
//! bytes from many sockets into line-delimited packets and hands each
//! to a tagged worker pool.
//!
//! Grounded on `examples/shell-pool-shpool/src/daemon.rs`'s use of
//! `nix::sys::select::{FdSet, select}` with a short fixed timeout to
//! poll a pipe fd cooperatively alongside a stop signal, and on
//! spec.md §4.8's event-loop contract. The active-connection map is
//! mutated only here, on this one thread; workers only ever set a
//! socket's `dirty` flag (see `line_socket`), which this loop reaps on
//! its next pass.

use std::collections::HashMap;
use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time;

use anyhow::Context;
use nix::sys::select::{select, FdSet};
use tracing::{info, instrument, warn};

use crate::line_socket::{LineSocket, ReadOutcome};
use crate::workerpool::WorkerPool;

const POLL_MILLIS: u64 = 100;

fn poll_timeval() -> nix::sys::time::TimeVal {
    nix::sys::time::TimeVal::new(0, 1000 * (POLL_MILLIS as nix::sys::time::suseconds_t))
}

/// A handle workers use to reply on a connection without touching the
/// active-connection map. Safe past the socket's logical close because
/// the underlying fd is only actually released once the event loop
/// reaps a dirty entry.
pub struct ConnectionHandle<S> {
    pub fd: i32,
    writer: Arc<Mutex<TcpStream>>,
    pub state: Arc<Mutex<S>>,
    close_requested: Arc<AtomicBool>,
}

// Hand-rolled so `S` itself need not implement `Clone`; only the
// `Arc`s wrapping it are ever duplicated.
impl<S> Clone for ConnectionHandle<S> {
    fn clone(&self) -> Self {
        ConnectionHandle {
            fd: self.fd,
            writer: Arc::clone(&self.writer),
            state: Arc::clone(&self.state),
            close_requested: Arc::clone(&self.close_requested),
        }
    }
}

impl<S> ConnectionHandle<S> {
    pub fn write_line(&self, line: &str) -> anyhow::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        let mut writer = self.writer.lock().unwrap();
        std::io::Write::write_all(&mut *writer, &buf).context("writing reply")
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().unwrap();
        std::io::Write::write_all(&mut *writer, bytes).context("writing reply")
    }

    /// Used by the `exit` command: mark this connection for closing on
    /// the event loop's next reap pass, same as an observed EOF.
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::Release);
    }
}

struct Connection<S> {
    socket: LineSocket,
    handle: ConnectionHandle<S>,
}

/// Implemented by the domain layer (the command dispatcher) to react
/// to the three events the event loop produces.
pub trait Handler<S>: Send + Sync
where
    S: Send + 'static,
{
    fn on_connection(&self) -> S;
    fn on_packet(&self, conn: ConnectionHandle<S>, line: String);
    fn on_closing(&self, state: S);
}

pub struct ConnectionPool<S> {
    listener: TcpListener,
    active: HashMap<i32, Connection<S>>,
}

impl<S: Send + 'static> ConnectionPool<S> {
    pub fn bind(addr: &str) -> anyhow::Result<ConnectionPool<S>> {
        let listener = TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;
        listener.set_nonblocking(true).context("setting listener nonblocking")?;
        info!("listening on {}", listener.local_addr()?);
        Ok(ConnectionPool { listener, active: HashMap::new() })
    }

    pub fn local_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the event loop until `stop_requested` is set. `dispatch`
    /// submits `(tag, job)` to the command worker pool; the tag is the
    /// connection's fd so packets from one connection always execute
    /// in the order they were read.
    #[instrument(skip_all)]
    pub fn run(
        mut self,
        handler: Arc<dyn Handler<S>>,
        command_pool: &WorkerPool,
        stop_requested: &AtomicBool,
    ) -> anyhow::Result<()> {
        while !stop_requested.load(Ordering::Acquire) {
            let mut readset = FdSet::new();
            readset.insert(self.listener.as_raw_fd());
            for fd in self.active.keys() {
                readset.insert(*fd);
            }

            let mut timeout = poll_timeval();
            let nready = select(None, Some(&mut readset), None, None, Some(&mut timeout))
                .context("selecting on connection fds")?;

            if nready > 0 {
                if readset.contains(self.listener.as_raw_fd()) {
                    self.accept_one(&handler);
                }
                let ready_fds: Vec<i32> =
                    self.active.keys().copied().filter(|fd| readset.contains(*fd)).collect();
                for fd in ready_fds {
                    self.service(fd, &handler, command_pool);
                }
            }

            self.reap_dirty(&handler, command_pool);
        }
        Ok(())
    }

    fn accept_one(&mut self, handler: &Arc<dyn Handler<S>>) {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                let fd = stream.as_raw_fd();
                if self.active.contains_key(&fd) {
                    warn!("rejecting duplicate accepted fd {}", fd);
                    return;
                }
                let writer = match stream.try_clone() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("failed to clone accepted stream: {}", e);
                        return;
                    }
                };
                let socket = match LineSocket::new(stream, false) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("failed to prepare accepted socket: {}", e);
                        return;
                    }
                };
                let state = handler.on_connection();
                let handle = ConnectionHandle {
                    fd,
                    writer: Arc::new(Mutex::new(writer)),
                    state: Arc::new(Mutex::new(state)),
                    close_requested: Arc::new(AtomicBool::new(false)),
                };
                info!("accepted connection from {}", peer);
                self.active.insert(fd, Connection { socket, handle });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => warn!("accept failed: {}", e),
        }
    }

    fn service(&mut self, fd: i32, handler: &Arc<dyn Handler<S>>, command_pool: &WorkerPool) {
        let conn = match self.active.get_mut(&fd) {
            Some(c) => c,
            None => return,
        };
        match conn.socket.buffer() {
            Ok(ReadOutcome::Eof) => conn.socket.mark_dirty(),
            Ok(ReadOutcome::WouldBlock) => {}
            Ok(ReadOutcome::Data(_)) => {
                let mut line = String::new();
                while conn.socket.get_line(&mut line) {
                    let handler = Arc::clone(handler);
                    let handle = conn.handle.clone();
                    let packet = std::mem::take(&mut line);
                    let tag = fd.to_string();
                    command_pool.schedule(&tag, move || handler.on_packet(handle, packet));
                }
            }
            Err(e) => {
                warn!("read error on fd {}: {}", fd, e);
                conn.socket.mark_dirty();
            }
        }
    }

    /// Schedule `on_closing` on the same tag (fd) as the connection's
    /// packets, so it only runs once every already-queued packet job
    /// for this connection has finished. By then the only remaining
    /// reference to the connection's state is the one captured here.
    fn reap_dirty(&mut self, handler: &Arc<dyn Handler<S>>, command_pool: &WorkerPool) {
        let dirty_fds: Vec<i32> = self
            .active
            .iter()
            .filter(|(_, c)| c.socket.is_dirty() || c.handle.close_requested.load(Ordering::Acquire))
            .map(|(fd, _)| *fd)
            .collect();
        for fd in dirty_fds {
            if let Some(conn) = self.active.remove(&fd) {
                let handler = Arc::clone(handler);
                let state_arc = conn.handle.state;
                let tag = fd.to_string();
                command_pool.schedule(&tag, move || {
                    let state = Arc::try_unwrap(state_arc)
                        .unwrap_or_else(|_| panic!("connection state for fd {fd} still referenced while closing"))
                        .into_inner()
                        .unwrap();
                    handler.on_closing(state);
                });
            }
        }
    }
}

/// Also read from `stream` until it would block, used by bundled
/// integration tests to drain a reply without needing `LineSocket`.
pub fn drain_nonblocking(stream: &mut TcpStream) -> Vec<u8> {
    stream.set_nonblocking(true).ok();
    let mut out = Vec::new();
    let mut buf = [0u8; 256];
    std::thread::sleep(time::Duration::from_millis(20));
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::TcpStream as StdTcpStream;
    use std::sync::mpsc;

    struct EchoHandler {
        tx: Mutex<mpsc::Sender<String>>,
    }

    impl Handler<()> for EchoHandler {
        fn on_connection(&self) {}
        fn on_packet(&self, conn: ConnectionHandle<()>, line: String) {
            self.tx.lock().unwrap().send(line.clone()).unwrap();
            conn.write_line(&line).unwrap();
        }
        fn on_closing(&self, _state: ()) {}
    }

    #[test]
    fn accepts_and_dispatches_one_packet() {
        let pool: ConnectionPool<()> = ConnectionPool::bind("127.0.0.1:0").unwrap();
        let addr = pool.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let handler = Arc::new(EchoHandler { tx: Mutex::new(tx) });
        let workers = Arc::new(WorkerPool::new(2));
        let stop = Arc::new(AtomicBool::new(false));

        let stop_clone = Arc::clone(&stop);
        let loop_thread = std::thread::spawn(move || {
            let workers = workers;
            pool.run(handler, &workers, &stop_clone).unwrap();
        });

        let mut client = StdTcpStream::connect(addr).unwrap();
        std::io::Write::write_all(&mut client, b"ping\n").unwrap();
        let echoed = rx.recv_timeout(time::Duration::from_secs(2)).unwrap();
        assert_eq!(echoed, "ping");

        stop.store(true, Ordering::Release);
        loop_thread.join().unwrap();
    }
}
