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

//! `login <user>`. Grounded on `examples/original_source/src/common/
//! commands/login.cpp`.

use crate::commands::convert::ConvertedArg;
use crate::commands::registry::{ArgKind, Command, ExecCtx, MiddlewareKind};
use crate::error::{CmdResult, ErrorKind};
use crate::path::Path;
use crate::session::SessionState;

#[derive(Default)]
pub struct LoginCommand;

const SPEC: &[ArgKind] = &[ArgKind::String];

impl Command for LoginCommand {
    fn middleware(&self) -> MiddlewareKind {
        MiddlewareKind::None
    }

    fn spec(&self) -> &'static [ArgKind] {
        SPEC
    }

    fn execute(&self, ctx: &mut ExecCtx, args: &[ConvertedArg]) -> CmdResult<()> {
        let user = args[0].as_str();
        if ctx.config.user_exists(user) {
            ctx.session.user = user.to_string();
            ctx.session.state = SessionState::AwaitingPassword;
            ctx.session.cwd = Path::empty_relative();
            Ok(())
        } else {
            Err(ErrorKind::BadArgument(format!("Unknown user: {user}")))
        }
    }
}
