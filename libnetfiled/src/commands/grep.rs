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

//! `grep <pattern>`. Grounded on `examples/original_source/src/common/
//! commands/grep.cpp`: a search under the current directory for files
//! whose contents match `pattern`, one relative path per reply line.
//!
//! The original chooses between two strategies depending on the
//! expected cost of an in-process scan: a short pattern over a small,
//! light subtree is matched directly against the cached tree; anything
//! larger is handed to the system `grep` so the expensive walk happens
//! off the heap this process tracks.

use std::process::Command as ProcessCommand;

use regex::Regex;

use crate::commands::convert::ConvertedArg;
use crate::commands::registry::{ArgKind, Command, ExecCtx, MiddlewareKind};
use crate::error::{CmdResult, ErrorKind};

#[derive(Default)]
pub struct GrepCommand;

const SPEC: &[ArgKind] = &[ArgKind::Pattern];

const MAX_INLINE_PATTERN_LEN: usize = 8;
const MAX_INLINE_N_REC_CHILDREN: u64 = 100;
const MAX_INLINE_SIZE: u64 = 100 * 65535;

impl Command for GrepCommand {
    fn middleware(&self) -> MiddlewareKind {
        MiddlewareKind::RequiresLoggedIn
    }

    fn spec(&self) -> &'static [ArgKind] {
        SPEC
    }

    fn execute(&self, ctx: &mut ExecCtx, args: &[ConvertedArg]) -> CmdResult<()> {
        let pattern = args[0].as_str();
        let cwd = ctx.session.cwd.clone();
        let here = ctx.cache.get_entry(&cwd)?;

        let use_inline = pattern.len() <= MAX_INLINE_PATTERN_LEN
            && here.n_rec_children <= MAX_INLINE_N_REC_CHILDREN
            && here.size <= MAX_INLINE_SIZE;

        let matches = if use_inline {
            grep_inline(ctx, pattern, &cwd)?
        } else {
            grep_shelled_out(ctx, pattern)
        };

        for m in matches {
            ctx.reply_line(&m);
        }
        Ok(())
    }
}

fn grep_inline(ctx: &ExecCtx, pattern: &str, cwd: &crate::path::Path) -> CmdResult<Vec<String>> {
    let re = Regex::new(&format!(".*{}.*", regex::escape(pattern)))
        .map_err(|e| ErrorKind::BadArgument(format!("bad pattern: {e}")))?;

    let mut out = Vec::new();
    for rel in ctx.cache.walk_files(cwd)? {
        let full = cwd.compose(&crate::path::Path::parse(&rel, &ctx.session.user));
        let mut reader = match ctx.cache.read(&full) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let contents = match reader.read_to_string() {
            Ok(s) => s,
            Err(_) => continue,
        };
        if contents.lines().any(|line| re.is_match(line)) {
            out.push(rel);
        }
    }
    Ok(out)
}

fn grep_shelled_out(ctx: &ExecCtx, pattern: &str) -> Vec<String> {
    let base = ctx.cache.base_dir().join(ctx.session.cwd.components().join("/"));
    let output = ProcessCommand::new("grep")
        .args(["-Rl", "-E", "--exclude-dir=.tmp", pattern])
        .arg(&base)
        .output();

    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| {
                std::path::Path::new(line).strip_prefix(&base).ok().map(|p| p.display().to_string())
            })
            .collect(),
        Err(e) => {
            tracing::warn!("failed to exec grep: {}", e);
            Vec::new()
        }
    }
}
