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

//! SIGINT/SIGTERM handling: flips a shared flag the event loop polls,
//! so shutdown runs through the normal drain-and-join path rather than
//! `std::process::exit`.
//!
//! Grounded on `examples/shell-pool-shpool/libshpool/src/daemon/
//! signals.rs`'s `register_conditional_shutdown`/`register` pairing: a
//! first term signal requests graceful shutdown, a second one (while
//! the first is still draining) exits immediately so a stuck shutdown
//! can't wedge the process.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;

/// Register handlers for `TERM_SIGNALS` that set `stop_requested`. A
/// second signal after the first exits the process with status 1
/// immediately, in case the event loop is wedged.
pub fn install(stop_requested: &Arc<AtomicBool>) -> anyhow::Result<()> {
    for sig in TERM_SIGNALS {
        flag::register_conditional_shutdown(*sig, 1, Arc::clone(stop_requested))?;
        flag::register(*sig, Arc::clone(stop_requested))?;
    }
    Ok(())
}
