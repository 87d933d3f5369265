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

//! Recoverable protocol-level error values.
//!
//! These are values, not types, by design (see the "dynamic dispatch
//! over commands" note in DESIGN.md): a command either returns
//! `Ok(())` after writing whatever reply lines it needs directly to
//! the socket, or it returns one of these and the worker's outermost
//! handler turns it into a single `Error: <message>\n` packet.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    CommandNotFound(String),
    BadArgument(String),
    AccessDenied,
    PathTooLong,
    FsNotFound(String),
    FsSkipArborescence(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::CommandNotFound(name) => write!(f, "command not found: {name}"),
            ErrorKind::BadArgument(msg) => write!(f, "{msg}"),
            ErrorKind::AccessDenied => write!(f, "access denied."),
            ErrorKind::PathTooLong => write!(f, "path too long."),
            ErrorKind::FsNotFound(path) => write!(f, "{path} not found"),
            ErrorKind::FsSkipArborescence(path) => {
                write!(f, "{path}: more than one missing parent component")
            }
        }
    }
}

impl std::error::Error for ErrorKind {}

/// The result type used throughout command execution. `NetworkError`
/// is deliberately *not* a variant here: it is propagated as a plain
/// `anyhow::Error` from socket operations and handled one layer up, in
/// the worker loop, by logging rather than replying (see
/// `connpool::Server::run_job`).
pub type CmdResult<T> = Result<T, ErrorKind>;
