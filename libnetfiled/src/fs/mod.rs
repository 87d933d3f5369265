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

//! The file-system sandbox: in-memory tree, aggregated metadata cache,
//! and write-then-rename temp files (spec.md §4.5, §4.6).

pub mod cache;
pub mod entry;
pub mod tempfile;

pub use cache::{EntrySnapshot, FileReader, FsCache};
pub use entry::{EntryKind, FsEntry, Status};
pub use tempfile::TemporaryFile;
