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

//! Wires the connection pool's `Handler` trait to the command layer:
//! parses a packet, enforces each command's login-state middleware,
//! converts arguments, executes, and turns a returned `ErrorKind` into
//! one `Error: ...` reply line.
//!
//! Grounded on spec.md §4.3/§4.9 and on `examples/original_source/
//! include/common/command.h`'s dispatch loop (look up by name, check
//! state, convert args, execute, catch and reply to any thrown error).

use std::sync::Arc;

use netfiled_protocol::format_error;
use tracing::warn;

use crate::argparser::parse_line;
use crate::commands::{self, ExecCtx, MiddlewareKind};
use crate::config::Config;
use crate::connpool::{ConnectionHandle, Handler};
use crate::error::ErrorKind;
use crate::fs::FsCache;
use crate::session::{LoggedInTable, Session, SessionState};
use crate::workerpool::WorkerPool;

pub struct Dispatcher {
    cache: Arc<FsCache>,
    logged_in: Arc<LoggedInTable>,
    // Owned as a separate `Arc` (rather than directly) so `run()` can
    // keep its own clone and reclaim it with `Arc::try_unwrap` once
    // every `Dispatcher` clone living in a worker job has dropped, to
    // join its threads on shutdown.
    transfer_pool: Arc<WorkerPool>,
    config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(
        cache: Arc<FsCache>,
        logged_in: Arc<LoggedInTable>,
        transfer_pool: Arc<WorkerPool>,
        config: Arc<Config>,
    ) -> Dispatcher {
        Dispatcher { cache, logged_in, transfer_pool, config }
    }
}

impl Handler<Session> for Dispatcher {
    fn on_connection(&self) -> Session {
        Session::new()
    }

    fn on_packet(&self, conn: ConnectionHandle<Session>, line: String) {
        let parsed = parse_line(&line);
        let name = match &parsed.name {
            Some(name) => name.clone(),
            None => return,
        };

        let state = Arc::clone(&conn.state);
        let mut session = state.lock().unwrap();

        if let Err(e) = self.dispatch_one(&conn, &mut session, &name, &parsed.args) {
            conn_reply(&conn, &format_error(&e.to_string()));
        }
    }

    fn on_closing(&self, state: Session) {
        if state.state == SessionState::LoggedIn {
            self.logged_in.decrement(&state.user);
        }
    }
}

impl Dispatcher {
    fn dispatch_one(
        &self,
        conn: &ConnectionHandle<Session>,
        session: &mut Session,
        name: &str,
        raw_args: &[crate::argparser::RawArg],
    ) -> Result<(), ErrorKind> {
        let command = commands::create(name)?;

        let middleware = command.middleware();
        // A session only stays `AwaitingPassword` across exactly one
        // command (`pass`); any other command drops it back to
        // `Anonymous` rather than leaving a half-finished login
        // hanging, matching the original's per-request state check.
        if session.state == SessionState::AwaitingPassword && middleware != MiddlewareKind::RequiresAwaitingPassword
        {
            session.state = SessionState::Anonymous;
            session.user.clear();
        }

        match middleware {
            MiddlewareKind::None => {}
            MiddlewareKind::RequiresAwaitingPassword => {
                if session.state != SessionState::AwaitingPassword {
                    return Err(ErrorKind::AccessDenied);
                }
            }
            MiddlewareKind::RequiresLoggedIn => {
                if session.state != SessionState::LoggedIn {
                    return Err(ErrorKind::AccessDenied);
                }
            }
            MiddlewareKind::RequiresLoggedOut => {
                if session.state != SessionState::Anonymous {
                    return Err(ErrorKind::AccessDenied);
                }
            }
        }

        let args = commands::convert::convert_args(command.spec(), raw_args, &session.cwd, &session.user)?;

        let mut ctx = ExecCtx {
            session,
            cache: Arc::clone(&self.cache),
            logged_in: &self.logged_in,
            transfer_pool: &self.transfer_pool,
            config: &self.config,
            conn,
        };
        command.execute(&mut ctx, &args)
    }
}

fn conn_reply(conn: &ConnectionHandle<Session>, line: &str) {
    if let Err(e) = conn.write_line(line) {
        warn!("failed writing error reply on fd {}: {}", conn.fd, e);
    }
}
