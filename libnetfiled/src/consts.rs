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

//! Fixed sizing constants from spec.md §5: two worker pools of fixed
//! size, never resized at runtime.

/// Threads in the command worker pool.
pub const COMMAND_POOL_THREADS: usize = 4;

/// Threads in the file-transfer worker pool.
pub const TRANSFER_POOL_THREADS: usize = 8;

pub use netfiled_protocol::{LINE_READ_CHUNK, MAX_PATH_LEN, TRANSFER_BLOCK_SIZE};
