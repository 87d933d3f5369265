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

//! `ls`. Grounded on `examples/original_source/src/common/commands/
//! ls.cpp`: a `ls -l`-style listing of the current directory, one
//! entry per reply line, hidden entries excluded.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

use crate::commands::convert::ConvertedArg;
use crate::commands::registry::{ArgKind, Command, ExecCtx, MiddlewareKind};
use crate::error::CmdResult;
use crate::fs::{EntryKind, EntrySnapshot};

#[derive(Default)]
pub struct LsCommand;

const SIX_MONTHS_SECS: i64 = 60 * 60 * 24 * 30 * 6;

impl Command for LsCommand {
    fn middleware(&self) -> MiddlewareKind {
        MiddlewareKind::RequiresLoggedIn
    }

    fn spec(&self) -> &'static [ArgKind] {
        &[]
    }

    fn execute(&self, ctx: &mut ExecCtx, _args: &[ConvertedArg]) -> CmdResult<()> {
        let rows = ctx.cache.list_dir(&ctx.session.cwd)?;
        let total: u64 = rows.iter().map(|(_, snap)| blocks(snap.size)).sum();
        ctx.reply_line(&format!("total {total}"));
        for (name, snap) in rows {
            ctx.reply_line(&format_row(&name, &snap));
        }
        Ok(())
    }
}

/// 512-byte block count for one row, the same unit `ls -l`'s `total`
/// line reports.
fn blocks(size: u64) -> u64 {
    (size + 511) / 512
}

fn format_row(name: &str, snap: &EntrySnapshot) -> String {
    format!(
        "{} {:>3} {:<8} {:<8} {:>10} {} {}",
        mode_string(snap),
        snap.nlink,
        snap.user,
        snap.group,
        snap.size,
        date_string(snap.mtime),
        name,
    )
}

/// `ls -l`-style ten-character mode string: type char plus three
/// rwx triplets for owner/group/other.
fn mode_string(snap: &EntrySnapshot) -> String {
    let type_char = if snap.kind == EntryKind::Directory { 'd' } else { '-' };
    let mode = snap.mode;
    let mut s = String::with_capacity(10);
    s.push(type_char);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    s
}

/// `%b %e %H:%M` for anything within the last six months, `%b %e  %Y`
/// otherwise — the same threshold coreutils `ls` uses to decide
/// whether a timestamp or a year is more useful to a reader.
fn date_string(mtime: i64) -> String {
    let dt: DateTime<Local> = Local.timestamp_opt(mtime, 0).single().unwrap_or_else(Local::now);
    let now = Local::now();
    if (now.timestamp() - mtime).abs() <= SIX_MONTHS_SECS {
        format!("{} {:>2} {:02}:{:02}", month_abbrev(dt.month()), dt.day(), dt.hour(), dt.minute())
    } else {
        format!("{} {:>2}  {}", month_abbrev(dt.month()), dt.day(), dt.year())
    }
}

fn month_abbrev(month: u32) -> &'static str {
    const NAMES: [&str; 12] =
        ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];
    NAMES[(month.saturating_sub(1) as usize).min(11)]
}
