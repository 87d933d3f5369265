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

//! `pass <pwd>`. Grounded on `examples/original_source/src/common/
//! commands/pass.cpp`: a failed attempt resets to `Anonymous` and
//! clears `user`, rather than terminating the connection, so the
//! client can retry with a fresh `login`.

use crate::commands::convert::ConvertedArg;
use crate::commands::registry::{ArgKind, Command, ExecCtx, MiddlewareKind};
use crate::error::{CmdResult, ErrorKind};
use crate::path::Path;
use crate::session::SessionState;

#[derive(Default)]
pub struct PassCommand;

const SPEC: &[ArgKind] = &[ArgKind::String];

impl Command for PassCommand {
    fn middleware(&self) -> MiddlewareKind {
        MiddlewareKind::RequiresAwaitingPassword
    }

    fn spec(&self) -> &'static [ArgKind] {
        SPEC
    }

    fn execute(&self, ctx: &mut ExecCtx, args: &[ConvertedArg]) -> CmdResult<()> {
        let pwd = args[0].as_str();
        if ctx.config.is_user_pwd_valid(&ctx.session.user, pwd) {
            ctx.session.state = SessionState::LoggedIn;
            ctx.session.cwd = Path::empty_relative();
            ctx.logged_in.increment(&ctx.session.user);
            Ok(())
        } else {
            ctx.session.user.clear();
            ctx.session.state = SessionState::Anonymous;
            ctx.session.cwd = Path::empty_relative();
            Err(ErrorKind::BadArgument("Unknown user/pwd pair".to_string()))
        }
    }
}
