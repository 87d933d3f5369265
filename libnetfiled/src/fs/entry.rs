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

//! In-memory tree nodes mirroring the on-disk sandbox.
//!
//! Grounded on `examples/original_source/include/common/
//! filesystem.h::FilesystemEntry`: `size` is a file's byte count or a
//! directory's aggregated descendant-file total, `nRecChildren` counts
//! all descendants recursively, and `status` is a metadata snapshot
//! (mode/mtime/nlink/uid/gid) taken at scan/insert time.

use std::collections::HashMap;
use std::os::unix::fs::MetadataExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone)]
pub struct Status {
    pub mode: u32,
    pub mtime: i64,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
}

impl Status {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Status {
        Status { mode: meta.mode(), mtime: meta.mtime(), nlink: meta.nlink(), uid: meta.uid(), gid: meta.gid() }
    }
}

#[derive(Debug, Clone)]
pub struct FsEntry {
    pub kind: EntryKind,
    /// File: byte count. Directory: sum of all descendant file sizes.
    pub size: u64,
    /// Count of all descendants, recursively.
    pub n_rec_children: u64,
    pub status: Status,
    pub children: HashMap<String, FsEntry>,
}

impl FsEntry {
    pub fn new_file(size: u64, status: Status) -> FsEntry {
        FsEntry { kind: EntryKind::File, size, n_rec_children: 0, status, children: HashMap::new() }
    }

    pub fn new_dir(status: Status) -> FsEntry {
        FsEntry { kind: EntryKind::Directory, size: 0, n_rec_children: 0, status, children: HashMap::new() }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// Check invariant P1 recursively: for every directory,
    /// `size = sum(child.size)` and `n_rec_children = sum(child.n_rec_children + 1)`.
    #[cfg(test)]
    pub fn check_invariant(&self) -> bool {
        if !self.is_dir() {
            return true;
        }
        let mut expected_size = 0u64;
        let mut expected_count = 0u64;
        for child in self.children.values() {
            if !child.check_invariant() {
                return false;
            }
            expected_size += child.size;
            expected_count += child.n_rec_children + 1;
        }
        self.size == expected_size && self.n_rec_children == expected_count
    }
}
