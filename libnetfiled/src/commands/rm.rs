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

//! `rm <path>`. Grounded on `examples/original_source/src/common/
//! commands/rm.cpp`.

use crate::commands::convert::ConvertedArg;
use crate::commands::registry::{ArgKind, Command, ExecCtx, MiddlewareKind};
use crate::error::CmdResult;

#[derive(Default)]
pub struct RmCommand;

const SPEC: &[ArgKind] = &[ArgKind::Path];

impl Command for RmCommand {
    fn middleware(&self) -> MiddlewareKind {
        MiddlewareKind::RequiresLoggedIn
    }

    fn spec(&self) -> &'static [ArgKind] {
        SPEC
    }

    fn execute(&self, ctx: &mut ExecCtx, args: &[ConvertedArg]) -> CmdResult<()> {
        ctx.cache.rm(args[0].as_path())
    }
}
