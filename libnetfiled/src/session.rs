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

//! Per-connection session state and the process-wide logged-in count.
//!
//! Grounded on spec.md §4.4 and on `examples/original_source/src/
//! common/commands/login.cpp`/`pass.cpp` for the exact transition
//! behavior (a failed `pass` resets to `Anonymous` and clears `user`,
//! but does *not* prevent a fresh `login` retry on the same
//! connection).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    AwaitingPassword,
    LoggedIn,
}

/// Per-connection mutable record. Owned by the connection pool, one
/// per accepted fd, and only ever touched by the worker thread affine
/// to that connection's tag (see `workerpool`), so no internal lock is
/// needed here.
pub struct Session {
    pub user: String,
    pub state: SessionState,
    pub cwd: Path,
}

impl Session {
    pub fn new() -> Session {
        Session { user: String::new(), state: SessionState::Anonymous, cwd: Path::empty_relative() }
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

/// The process-wide table of active-session counts per user, guarded
/// by one mutex (spec.md §3, §5).
#[derive(Default)]
pub struct LoggedInTable {
    counts: Mutex<HashMap<String, u32>>,
}

impl LoggedInTable {
    pub fn new() -> LoggedInTable {
        LoggedInTable::default()
    }

    pub fn increment(&self, user: &str) {
        let mut counts = self.counts.lock().unwrap();
        *counts.entry(user.to_string()).or_insert(0) += 1;
    }

    pub fn decrement(&self, user: &str) {
        let mut counts = self.counts.lock().unwrap();
        if let Some(count) = counts.get_mut(user) {
            if *count <= 1 {
                counts.remove(user);
            } else {
                *count -= 1;
            }
        }
    }

    pub fn count(&self, user: &str) -> u32 {
        let counts = self.counts.lock().unwrap();
        *counts.get(user).unwrap_or(&0)
    }

    /// Users with at least one active logged-in session, key-sorted
    /// (backs the `w` command).
    pub fn logged_in_users(&self) -> Vec<String> {
        let counts = self.counts.lock().unwrap();
        let mut users: Vec<String> = counts.keys().cloned().collect();
        users.sort();
        users
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn increment_decrement_tracks_count() {
        let table = LoggedInTable::new();
        table.increment("alice");
        table.increment("alice");
        assert_eq!(table.count("alice"), 2);
        table.decrement("alice");
        assert_eq!(table.count("alice"), 1);
        table.decrement("alice");
        assert_eq!(table.count("alice"), 0);
        assert!(table.logged_in_users().is_empty());
    }

    #[test]
    fn logged_in_users_are_key_sorted() {
        let table = LoggedInTable::new();
        table.increment("bob");
        table.increment("alice");
        assert_eq!(table.logged_in_users(), vec!["alice".to_string(), "bob".to_string()]);
    }
}
