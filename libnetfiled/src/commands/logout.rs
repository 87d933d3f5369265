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

//! `logout`. Grounded on `examples/original_source/src/common/
//! commands/logout.cpp`.

use crate::commands::convert::ConvertedArg;
use crate::commands::registry::{ArgKind, Command, ExecCtx, MiddlewareKind};
use crate::error::CmdResult;
use crate::path::Path;
use crate::session::SessionState;

#[derive(Default)]
pub struct LogoutCommand;

impl Command for LogoutCommand {
    fn middleware(&self) -> MiddlewareKind {
        MiddlewareKind::RequiresLoggedIn
    }

    fn spec(&self) -> &'static [ArgKind] {
        &[]
    }

    fn execute(&self, ctx: &mut ExecCtx, _args: &[ConvertedArg]) -> CmdResult<()> {
        ctx.logged_in.decrement(&ctx.session.user);
        ctx.session.user.clear();
        ctx.session.cwd = Path::empty_relative();
        ctx.session.state = SessionState::Anonymous;
        Ok(())
    }
}
