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

//! The netfiled server library: a sandboxed, multi-connection,
//! line-oriented TCP file-manipulation service.

pub mod argparser;
pub mod commands;
pub mod config;
pub mod connpool;
pub mod consts;
pub mod dispatcher;
pub mod error;
pub mod fs;
pub mod line_socket;
pub mod path;
pub mod session;
pub mod signals;
pub mod workerpool;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::connpool::ConnectionPool;
use crate::dispatcher::Dispatcher;
use crate::fs::FsCache;
use crate::session::Session;
use crate::workerpool::WorkerPool;

/// A bound-but-not-yet-serving instance: the listener and both worker
/// pools exist, the sandbox has been scanned into the cache, but no
/// connection has been accepted. Split from `run` so callers (the
/// `serve` subcommand, integration tests) can learn the bound address
/// before the event loop starts blocking.
pub struct Server {
    pool: ConnectionPool<Session>,
    command_pool: WorkerPool,
    transfer_pool: Arc<WorkerPool>,
    dispatcher: Arc<Dispatcher>,
    stop_requested: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(config: Config) -> anyhow::Result<Server> {
        let cache = Arc::new(FsCache::new(config.base.clone()).context("building file-system cache")?);
        let logged_in = Arc::new(crate::session::LoggedInTable::new());
        let config = Arc::new(config);

        let command_pool = WorkerPool::new(consts::COMMAND_POOL_THREADS);
        let transfer_pool = Arc::new(WorkerPool::new(consts::TRANSFER_POOL_THREADS));

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&cache),
            Arc::clone(&logged_in),
            Arc::clone(&transfer_pool),
            Arc::clone(&config),
        ));

        let pool: ConnectionPool<Session> =
            ConnectionPool::bind(&format!("0.0.0.0:{}", config.port)).context("binding listener")?;

        Ok(Server {
            pool,
            command_pool,
            transfer_pool,
            dispatcher,
            stop_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.pool.local_addr()
    }

    /// A handle that, when invoked, requests the event loop stop on
    /// its next pass, same as a `TERM`/`INT` signal.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_requested)
    }

    /// Register the process-wide `TERM`/`INT` handlers against this
    /// server's stop flag. Not called by tests, which stop the server
    /// directly via `stop_handle`.
    pub fn install_signal_handlers(&self) -> anyhow::Result<()> {
        signals::install(&self.stop_requested)
    }

    /// Drive the event loop until stopped, then drain and join both
    /// worker pools before returning.
    pub fn run(self) -> anyhow::Result<()> {
        let Server { pool, command_pool, transfer_pool, dispatcher, stop_requested } = self;

        pool.run(dispatcher, &command_pool, &stop_requested)?;

        info!("shutting down, draining worker pools");
        command_pool.join();
        Arc::try_unwrap(transfer_pool)
            .unwrap_or_else(|_| panic!("transfer pool still referenced after command pool drained"))
            .join();
        Ok(())
    }
}

/// Run the server until a `TERM`/`INT` signal requests shutdown.
pub fn run(config: Config) -> anyhow::Result<()> {
    let server = Server::bind(config)?;
    server.install_signal_handlers().context("installing signal handlers")?;
    info!("netfiled listening on {}", server.local_addr()?);
    server.run()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    fn test_config(base: &std::path::Path, port: u16) -> Config {
        let toml = config::parse_toml_config(&format!(
            "base = {:?}\nport = {}\n\n[users]\nalice = \"hunter2\"\n",
            base.display(),
            port
        ))
        .unwrap();
        toml.into_config(std::path::Path::new(".")).unwrap()
    }

    #[test]
    fn login_pass_whoami_roundtrip_over_real_socket() {
        let dir = tempfile::tempdir().unwrap();
        let server = Server::bind(test_config(dir.path(), 0)).unwrap();
        let addr = server.local_addr().unwrap();
        let stop = server.stop_handle();

        let handle = std::thread::spawn(move || server.run().unwrap());

        let mut client = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(client.try_clone().unwrap());

        client.write_all(b"login alice\n").unwrap();
        client.write_all(b"pass hunter2\n").unwrap();
        client.write_all(b"whoami\n").unwrap();

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line.trim_end(), "alice");

        stop.store(true, Ordering::Release);
        std::thread::sleep(Duration::from_millis(150));
        drop(client);
        handle.join().unwrap();
    }
}
