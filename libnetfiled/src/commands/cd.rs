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

//! `cd <path>`. Grounded on `examples/original_source/src/common/
//! commands/cd.cpp`.

use crate::commands::convert::ConvertedArg;
use crate::commands::registry::{ArgKind, Command, ExecCtx, MiddlewareKind};
use crate::error::CmdResult;

#[derive(Default)]
pub struct CdCommand;

const SPEC: &[ArgKind] = &[ArgKind::Path];

impl Command for CdCommand {
    fn middleware(&self) -> MiddlewareKind {
        MiddlewareKind::RequiresLoggedIn
    }

    fn spec(&self) -> &'static [ArgKind] {
        SPEC
    }

    fn execute(&self, ctx: &mut ExecCtx, args: &[ConvertedArg]) -> CmdResult<()> {
        let target = args[0].as_path();
        let entry = ctx.cache.get_entry(target)?;
        if entry.kind != crate::fs::EntryKind::Directory {
            ctx.reply_line(&format!("cd: not a directory {target}"));
            return Ok(());
        }
        ctx.session.cwd = target.clone();
        Ok(())
    }
}
