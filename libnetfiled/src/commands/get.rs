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

//! `get <path>`. Grounded on `examples/original_source/src/common/
//! commands/get.cpp`: opens an ephemeral listening socket, replies
//! with its port and the file's size on the command connection, then
//! streams the file to whichever client connects there.

use std::io::Write;
use std::net::TcpListener;
use std::sync::Arc;

use crate::commands::convert::ConvertedArg;
use crate::commands::registry::{ArgKind, Command, ExecCtx, MiddlewareKind};
use crate::error::{CmdResult, ErrorKind};
use netfiled_protocol::{format_get_reply, TRANSFER_BLOCK_SIZE};

#[derive(Default)]
pub struct GetCommand;

const SPEC: &[ArgKind] = &[ArgKind::Path];

impl Command for GetCommand {
    fn middleware(&self) -> MiddlewareKind {
        MiddlewareKind::RequiresLoggedIn
    }

    fn spec(&self) -> &'static [ArgKind] {
        SPEC
    }

    fn execute(&self, ctx: &mut ExecCtx, args: &[ConvertedArg]) -> CmdResult<()> {
        let path = args[0].as_path().clone();
        let entry = ctx.cache.get_entry(&path)?;
        if entry.kind == crate::fs::EntryKind::Directory {
            return Err(ErrorKind::BadArgument(format!("{path} is a directory")));
        }

        let listener = TcpListener::bind("127.0.0.1:0")
            .map_err(|e| ErrorKind::BadArgument(format!("opening transfer socket: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| ErrorKind::BadArgument(format!("reading transfer port: {e}")))?
            .port();

        ctx.reply_line(&format_get_reply(port, entry.size));

        let cache = Arc::clone(&ctx.cache);
        let tag = path.canonical();
        ctx.transfer_pool.schedule(&tag, move || {
            if let Err(e) = run_transfer(&cache, &path, listener) {
                tracing::warn!("get transfer for {} failed: {}", path, e);
            }
        });
        Ok(())
    }
}

fn run_transfer(
    cache: &crate::fs::FsCache,
    path: &crate::path::Path,
    listener: TcpListener,
) -> anyhow::Result<()> {
    let (mut stream, _peer) = listener.accept()?;
    let mut reader = cache.read(path).map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut buf = vec![0u8; TRANSFER_BLOCK_SIZE];
    loop {
        let n = reader.read_chunk(&mut buf)?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n])?;
    }
    Ok(())
}
