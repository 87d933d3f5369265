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

//! `date`. Grounded on `examples/original_source/src/common/commands/
//! date.cpp`, which shells out to the system `date` binary.

use std::process::Command as ProcessCommand;

use crate::commands::convert::ConvertedArg;
use crate::commands::registry::{ArgKind, Command, ExecCtx, MiddlewareKind};
use crate::error::CmdResult;

#[derive(Default)]
pub struct DateCommand;

impl Command for DateCommand {
    fn middleware(&self) -> MiddlewareKind {
        MiddlewareKind::RequiresLoggedIn
    }

    fn spec(&self) -> &'static [ArgKind] {
        &[]
    }

    fn execute(&self, ctx: &mut ExecCtx, _args: &[ConvertedArg]) -> CmdResult<()> {
        match ProcessCommand::new("date").output() {
            Ok(output) => ctx.reply_line(String::from_utf8_lossy(&output.stdout).trim_end()),
            Err(e) => tracing::warn!("failed to exec date: {}", e),
        }
        Ok(())
    }
}
