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

//! Write-then-rename commit for uploaded files.
//!
//! Grounded on spec.md §4.6 and on `examples/original_source/src/
//! common/commands/put.cpp`'s use of `Filesystem::createFile`/
//! `Filesystem::commit`: a `put` (or a cache overwrite) never writes
//! directly at its final path, it writes to a scratch file under
//! `<base>/.tmp/` and only `rename(2)`s it into place once the transfer
//! is known-complete, so a client that disconnects mid-upload leaves
//! no partial file visible at the real path.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::path::Path;

pub struct TemporaryFile {
    tmp_path: PathBuf,
    real_path: PathBuf,
    logical_path: Path,
    file: File,
    committed: bool,
}

impl TemporaryFile {
    pub(crate) fn create(tmp_path: PathBuf, real_path: PathBuf, logical_path: Path) -> io::Result<TemporaryFile> {
        let file = File::create(&tmp_path)?;
        Ok(TemporaryFile { tmp_path, real_path, logical_path, file, committed: false })
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    pub fn real_path(&self) -> &std::path::Path {
        &self.real_path
    }

    pub fn logical_path(&self) -> &Path {
        &self.logical_path
    }

    /// Flush, rename into place, and return the final byte count. Only
    /// called by `FsCache::commit`, which also updates the tree.
    pub(crate) fn finish(mut self) -> io::Result<u64> {
        self.file.flush()?;
        let size = self.file.metadata()?.len();
        if let Some(parent) = self.real_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&self.tmp_path, &self.real_path)?;
        self.committed = true;
        Ok(size)
    }
}

impl Drop for TemporaryFile {
    /// An abandoned upload (dropped without `commit`) leaves nothing at
    /// the real path; clean up its scratch file too.
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn abandoned_upload_leaves_no_scratch_file() {
        let dir = tempdir().unwrap();
        let tmp_path = dir.path().join("scratch");
        let real_path = dir.path().join("real.txt");
        {
            let mut tmp =
                TemporaryFile::create(tmp_path.clone(), real_path.clone(), Path::empty_relative()).unwrap();
            tmp.write_all(b"partial").unwrap();
        }
        assert!(!tmp_path.exists());
        assert!(!real_path.exists());
    }

    #[test]
    fn commit_renames_and_reports_size() {
        let dir = tempdir().unwrap();
        let tmp_path = dir.path().join("scratch");
        let real_path = dir.path().join("real.txt");
        let mut tmp =
            TemporaryFile::create(tmp_path.clone(), real_path.clone(), Path::empty_relative()).unwrap();
        tmp.write_all(b"hello").unwrap();
        let size = tmp.finish().unwrap();
        assert_eq!(size, 5);
        assert!(real_path.exists());
        assert!(!tmp_path.exists());
    }
}
