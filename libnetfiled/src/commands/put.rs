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

//! `put <path> <size>`. Grounded on `examples/original_source/src/
//! common/commands/put.cpp`: opens an ephemeral listening socket,
//! replies with its port on the command connection, then receives
//! exactly `size` bytes from whichever client connects there and
//! commits it atomically. A short upload (the peer closes before
//! `size` bytes arrive) is reported back on the command connection as
//! `did not receive the whole file` and leaves no file behind.

use std::io::Read;
use std::net::TcpListener;
use std::sync::Arc;

use crate::commands::convert::ConvertedArg;
use crate::commands::registry::{ArgKind, Command, ExecCtx, MiddlewareKind};
use crate::connpool::ConnectionHandle;
use crate::error::{CmdResult, ErrorKind};
use crate::session::Session;
use netfiled_protocol::{format_error, format_put_reply, TRANSFER_BLOCK_SIZE};

#[derive(Default)]
pub struct PutCommand;

const SPEC: &[ArgKind] = &[ArgKind::Path, ArgKind::Int];

impl Command for PutCommand {
    fn middleware(&self) -> MiddlewareKind {
        MiddlewareKind::RequiresLoggedIn
    }

    fn spec(&self) -> &'static [ArgKind] {
        SPEC
    }

    fn execute(&self, ctx: &mut ExecCtx, args: &[ConvertedArg]) -> CmdResult<()> {
        let path = args[0].as_path().clone();
        let size = args[1].as_int();
        if size < 0 {
            return Err(ErrorKind::BadArgument(format!("negative size: {size}")));
        }
        let size = size as u64;

        // Validate arborescence eagerly so a malformed path is rejected
        // on the command connection, before any bytes are accepted.
        let tmp = ctx.cache.create_file(&path)?;

        let listener = TcpListener::bind("127.0.0.1:0")
            .map_err(|e| ErrorKind::BadArgument(format!("opening transfer socket: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| ErrorKind::BadArgument(format!("reading transfer port: {e}")))?
            .port();

        ctx.reply_line(&format_put_reply(port, &path.canonical()));

        let cache = Arc::clone(&ctx.cache);
        let tag = path.canonical();
        let conn = ctx.conn.clone();
        ctx.transfer_pool.schedule(&tag, move || {
            if let Err(e) = run_transfer(&cache, tmp, listener, size, &conn) {
                tracing::warn!("put transfer for {} failed: {}", path, e);
            }
        });
        Ok(())
    }
}

fn run_transfer(
    cache: &crate::fs::FsCache,
    mut tmp: crate::fs::TemporaryFile,
    listener: TcpListener,
    size: u64,
    conn: &ConnectionHandle<Session>,
) -> anyhow::Result<()> {
    let (mut stream, _peer) = listener.accept()?;
    let mut buf = vec![0u8; TRANSFER_BLOCK_SIZE];
    let mut received: u64 = 0;
    while received < size {
        let want = std::cmp::min(buf.len() as u64, size - received) as usize;
        let n = stream.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        tmp.write_all(&buf[..n])?;
        received += n as u64;
    }

    if received < size {
        // Dropping `tmp` here (rather than committing) removes its
        // scratch file, so the short upload leaves nothing behind.
        conn.write_line(&format_error("did not receive the whole file"))?;
        return Ok(());
    }

    cache.commit(tmp)
}
