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

//! The command registry: name -> factory, populated once via
//! `lazy_static`. Grounded on `examples/original_source/include/
//! common/command.h::CommandFactory` and its `REGISTER_COMMAND` macro,
//! which populates a static map as a side effect of static
//! initialization; Rust has no equivalent side-effecting statics, so
//! the map is built explicitly instead, listing every command once.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;

use crate::commands::convert::ConvertedArg;
use crate::connpool::ConnectionHandle;
use crate::error::{CmdResult, ErrorKind};
use crate::fs::FsCache;
use crate::session::{LoggedInTable, Session};
use crate::workerpool::WorkerPool;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareKind {
    None,
    RequiresAwaitingPassword,
    RequiresLoggedIn,
    RequiresLoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Path,
    Int,
    String,
    Hostname,
    Pattern,
}

/// Everything a command's `execute` needs, borrowed for the duration
/// of one dispatch. `session` is already locked by the dispatcher, so
/// commands mutate it directly (cwd, login state) with no further
/// synchronization — tag affinity guarantees no other worker can be
/// touching the same connection's session concurrently.
pub struct ExecCtx<'a> {
    pub session: &'a mut Session,
    /// Owned clone of the server's cache handle: cheap (one atomic
    /// bump) and lets commands like `get`/`put` hand it to a job that
    /// outlives this dispatch on the transfer pool.
    pub cache: Arc<FsCache>,
    pub logged_in: &'a LoggedInTable,
    pub transfer_pool: &'a WorkerPool,
    pub config: &'a Config,
    pub conn: &'a ConnectionHandle<Session>,
}

impl<'a> ExecCtx<'a> {
    /// Write one reply line. Failures are a `NetworkError`-class
    /// condition (spec.md §4.11): logged, not surfaced to the client.
    pub fn reply_line(&self, line: &str) {
        if let Err(e) = self.conn.write_line(line) {
            tracing::warn!("failed writing reply on fd {}: {}", self.conn.fd, e);
        }
    }

    pub fn reply_lines<'b>(&self, lines: impl IntoIterator<Item = &'b str>) {
        for line in lines {
            self.reply_line(line);
        }
    }
}

pub trait Command: Send + Sync {
    fn middleware(&self) -> MiddlewareKind;
    fn spec(&self) -> &'static [ArgKind];
    fn execute(&self, ctx: &mut ExecCtx, args: &[ConvertedArg]) -> CmdResult<()>;
}

type Factory = fn() -> Box<dyn Command>;

macro_rules! factory {
    ($ty:ty) => {
        (|| Box::new(<$ty>::default()) as Box<dyn Command>) as Factory
    };
}

lazy_static! {
    static ref REGISTRY: HashMap<&'static str, Factory> = {
        use crate::commands::*;
        let mut m: HashMap<&'static str, Factory> = HashMap::new();
        m.insert("login", factory!(login::LoginCommand));
        m.insert("pass", factory!(pass::PassCommand));
        m.insert("logout", factory!(logout::LogoutCommand));
        m.insert("whoami", factory!(whoami::WhoamiCommand));
        m.insert("w", factory!(w::WCommand));
        m.insert("ls", factory!(ls::LsCommand));
        m.insert("cd", factory!(cd::CdCommand));
        m.insert("mkdir", factory!(mkdir::MkdirCommand));
        m.insert("rm", factory!(rm::RmCommand));
        m.insert("grep", factory!(grep::GrepCommand));
        m.insert("get", factory!(get::GetCommand));
        m.insert("put", factory!(put::PutCommand));
        m.insert("date", factory!(date::DateCommand));
        m.insert("ping", factory!(ping::PingCommand));
        m.insert("exit", factory!(exit::ExitCommand));
        m
    };
}

/// Look up and instantiate a fresh command by name.
pub fn create(name: &str) -> CmdResult<Box<dyn Command>> {
    REGISTRY.get(name).map(|f| f()).ok_or_else(|| ErrorKind::CommandNotFound(name.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_wire_command_is_registered() {
        for name in netfiled_protocol::COMMAND_NAMES {
            assert!(create(name).is_ok(), "missing command {name}");
        }
    }

    #[test]
    fn unknown_command_is_command_not_found() {
        let err = create("frobnicate").unwrap_err();
        assert!(matches!(err, ErrorKind::CommandNotFound(_)));
    }
}
