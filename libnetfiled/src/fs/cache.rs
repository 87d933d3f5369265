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

//! The in-memory tree that mirrors the on-disk sandbox, with
//! hierarchical aggregated metadata (spec.md §4.5).
//!
//! One global mutex protects the tree and the uid/gid name caches
//! (spec.md §5: "FS cache: one mutex; the tree and the caches of
//! uid->name and gid->name are all protected by it"). Grounded on
//! `examples/original_source/include/common/
//! filesystem.h::Filesystem::{scan,insertNode,removeNode,getEntryNode}`.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::MetadataExt;
use std::path::{Path as StdPath, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing::{info, instrument, warn};

use crate::error::ErrorKind;
use crate::fs::entry::{EntryKind, FsEntry, Status};
use crate::fs::tempfile::TemporaryFile;
use crate::path::Path;

const TMP_DIR_NAME: &str = ".tmp";

struct Inner {
    root: FsEntry,
    base: PathBuf,
    tmp_counter: u64,
    uid_names: HashMap<u32, String>,
    gid_names: HashMap<u32, String>,
}

pub struct FsCache {
    inner: Mutex<Inner>,
}

/// A read-only view onto a file already verified present in the
/// cache, for `get`/`grep`/`read`.
pub struct FileReader {
    file: fs::File,
}

impl FileReader {
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    pub fn read_to_string(&mut self) -> io::Result<String> {
        let mut s = String::new();
        use std::io::Read as _;
        self.file.read_to_string(&mut s)?;
        Ok(s)
    }
}

impl FsCache {
    #[instrument(skip_all)]
    pub fn new(base: PathBuf) -> anyhow::Result<FsCache> {
        let tmp_dir = base.join(TMP_DIR_NAME);
        if !tmp_dir.exists() {
            fs::create_dir_all(&tmp_dir).context("creating .tmp dir")?;
        }

        let status = Status::from_metadata(&fs::metadata(&base).context("stating base dir")?);
        let cache = FsCache {
            inner: Mutex::new(Inner {
                root: FsEntry::new_dir(status),
                base,
                tmp_counter: 0,
                uid_names: HashMap::new(),
                gid_names: HashMap::new(),
            }),
        };
        cache.scan()?;
        Ok(cache)
    }

    /// Recursively walk the base directory and populate the tree,
    /// excluding `.tmp`.
    #[instrument(skip_all)]
    pub fn scan(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let base = inner.base.clone();
        let mut root = FsEntry::new_dir(Status::from_metadata(&fs::metadata(&base)?));
        scan_dir(&base, &mut root, &base)?;
        inner.root = root;
        info!("scanned base directory, {} top-level entries", inner.root.children.len());
        Ok(())
    }

    pub fn get_entry(&self, path: &Path) -> Result<EntrySnapshot, ErrorKind> {
        let mut inner = self.inner.lock().unwrap();
        let entry = get_node(&inner.root, path.components())
            .ok_or_else(|| ErrorKind::FsNotFound(path.canonical()))?
            .clone();
        Ok(EntrySnapshot::from_entry(&entry, &mut inner))
    }

    pub fn username(&self, uid: u32) -> String {
        let mut inner = self.inner.lock().unwrap();
        resolve_uid_name(&mut inner, uid)
    }

    pub fn groupname(&self, gid: u32) -> String {
        let mut inner = self.inner.lock().unwrap();
        resolve_gid_name(&mut inner, gid)
    }

    /// List the visible (non-hidden) children of a directory, with
    /// aggregated metadata, for `ls`.
    pub fn list_dir(&self, path: &Path) -> Result<Vec<(String, EntrySnapshot)>, ErrorKind> {
        let mut inner = self.inner.lock().unwrap();
        let children: Vec<(String, FsEntry)> = get_node(&inner.root, path.components())
            .ok_or_else(|| ErrorKind::FsNotFound(path.canonical()))?
            .children
            .iter()
            .filter(|(name, _)| !name.starts_with('.'))
            .map(|(name, e)| (name.clone(), e.clone()))
            .collect();
        let mut rows: Vec<(String, EntrySnapshot)> =
            children.iter().map(|(name, e)| (name.clone(), EntrySnapshot::from_entry(e, &mut inner))).collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    /// Depth-first, locale-sorted walk under `path`, skipping hidden
    /// entries, yielding `(relative_path, is_file)`. Used by `grep`'s
    /// in-process fast path.
    pub fn walk_files(&self, path: &Path) -> Result<Vec<String>, ErrorKind> {
        let inner = self.inner.lock().unwrap();
        let dir = get_node(&inner.root, path.components())
            .ok_or_else(|| ErrorKind::FsNotFound(path.canonical()))?;
        let mut out = Vec::new();
        walk_sorted(dir, "", &mut out);
        Ok(out)
    }

    #[instrument(skip(self))]
    pub fn mkdir(&self, path: &Path) -> Result<(), ErrorKind> {
        let mut inner = self.inner.lock().unwrap();
        let components = path.components().to_vec();
        if components.is_empty() {
            return Err(ErrorKind::FsSkipArborescence(path.canonical()));
        }
        {
            let (_, leaf) = split_parent(&inner.root, &components)?;
            if leaf.is_some() {
                return Err(ErrorKind::FsSkipArborescence(path.canonical()));
            }
        }

        let disk_path = inner.base.join(components.join("/"));
        fs::create_dir(&disk_path)
            .map_err(|e| ErrorKind::BadArgument(format!("mkdir: {e}")))?;
        let status = Status::from_metadata(
            &fs::metadata(&disk_path).unwrap_or_else(|_| fs::metadata(&inner.base).unwrap()),
        );

        insert_leaf(&mut inner.root, &components, FsEntry::new_dir(status));
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn rm(&self, path: &Path) -> Result<(), ErrorKind> {
        let mut inner = self.inner.lock().unwrap();
        let components = path.components().to_vec();
        if components.is_empty() {
            return Err(ErrorKind::FsNotFound(path.canonical()));
        }
        if get_node(&inner.root, &components).is_none() {
            return Err(ErrorKind::FsNotFound(path.canonical()));
        }

        let disk_path = inner.base.join(components.join("/"));
        remove_on_disk(&disk_path).map_err(|e| ErrorKind::BadArgument(format!("rm: {e}")))?;
        remove_subtree(&mut inner.root, &components);
        Ok(())
    }

    /// Returns a `TemporaryFile` open for writing under `<base>/.tmp/`.
    /// Permitted only if at most one component of `path` is missing.
    #[instrument(skip(self))]
    pub fn create_file(&self, path: &Path) -> Result<TemporaryFile, ErrorKind> {
        let mut inner = self.inner.lock().unwrap();
        let components = path.components().to_vec();
        if components.is_empty() {
            return Err(ErrorKind::FsSkipArborescence(path.canonical()));
        }
        split_parent(&inner.root, &components)?;

        inner.tmp_counter += 1;
        let tmp_name = format!("{}", inner.tmp_counter);
        let tmp_path = inner.base.join(TMP_DIR_NAME).join(&tmp_name);
        let real_path = inner.base.join(components.join("/"));

        TemporaryFile::create(tmp_path, real_path, path.clone())
            .map_err(|e| ErrorKind::BadArgument(format!("creating temp file: {e}")))
    }

    /// Atomically publish `tmp` at its real path: rename, drop any
    /// prior cache entry at the target, insert the new one.
    #[instrument(skip(self, tmp))]
    pub fn commit(&self, tmp: TemporaryFile) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let real_path = tmp.real_path().to_path_buf();
        let logical_path = tmp.logical_path().clone();
        let size = tmp.finish()?;

        let status = Status::from_metadata(&fs::symlink_metadata(&real_path)?);
        insert_leaf(&mut inner.root, logical_path.components(), FsEntry::new_file(size, status));
        Ok(())
    }

    /// Existence check then a read-only stream for `get`/`grep`.
    pub fn read(&self, path: &Path) -> Result<FileReader, ErrorKind> {
        let inner = self.inner.lock().unwrap();
        if get_node(&inner.root, path.components()).is_none() {
            return Err(ErrorKind::FsNotFound(path.canonical()));
        }
        let disk_path = inner.base.join(path.components().join("/"));
        let file = fs::File::open(&disk_path)
            .map_err(|_| ErrorKind::FsNotFound(path.canonical()))?;
        Ok(FileReader { file })
    }

    pub fn base_dir(&self) -> PathBuf {
        self.inner.lock().unwrap().base.clone()
    }
}

/// A copy of the aggregated metadata for one node, safe to hand back
/// to a command without holding the cache lock.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub kind: EntryKind,
    pub size: u64,
    pub n_rec_children: u64,
    pub mode: u32,
    pub mtime: i64,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub user: String,
    pub group: String,
}

impl EntrySnapshot {
    fn from_entry(entry: &FsEntry, inner: &mut Inner) -> EntrySnapshot {
        let user = resolve_uid_name(inner, entry.status.uid);
        let group = resolve_gid_name(inner, entry.status.gid);
        EntrySnapshot {
            kind: entry.kind,
            size: entry.size,
            n_rec_children: entry.n_rec_children,
            mode: entry.status.mode,
            mtime: entry.status.mtime,
            nlink: entry.status.nlink,
            uid: entry.status.uid,
            gid: entry.status.gid,
            user,
            group,
        }
    }
}

fn resolve_uid_name(inner: &mut Inner, uid: u32) -> String {
    if let Some(name) = inner.uid_names.get(&uid) {
        return name.clone();
    }
    let name = lookup_user_name(uid).unwrap_or_default();
    inner.uid_names.insert(uid, name.clone());
    name
}

fn resolve_gid_name(inner: &mut Inner, gid: u32) -> String {
    if let Some(name) = inner.gid_names.get(&gid) {
        return name.clone();
    }
    let name = lookup_group_name(gid).unwrap_or_default();
    inner.gid_names.insert(gid, name.clone());
    name
}

fn lookup_user_name(uid: u32) -> Option<String> {
    // Safety: getpwuid returns a pointer into static storage owned by
    // libc; we copy the name out immediately and never retain it.
    unsafe {
        let passwd = libc::getpwuid(uid);
        if passwd.is_null() {
            return None;
        }
        let name = std::ffi::CStr::from_ptr((*passwd).pw_name);
        Some(name.to_string_lossy().into_owned())
    }
}

fn lookup_group_name(gid: u32) -> Option<String> {
    // Safety: same contract as lookup_user_name, for getgrgid.
    unsafe {
        let group = libc::getgrgid(gid);
        if group.is_null() {
            return None;
        }
        let name = std::ffi::CStr::from_ptr((*group).gr_name);
        Some(name.to_string_lossy().into_owned())
    }
}

fn get_node<'a>(root: &'a FsEntry, components: &[String]) -> Option<&'a FsEntry> {
    let mut node = root;
    for component in components {
        node = node.children.get(component)?;
    }
    Some(node)
}

fn get_node_mut<'a>(root: &'a mut FsEntry, components: &[String]) -> Option<&'a mut FsEntry> {
    let mut node = root;
    for component in components {
        node = node.children.get_mut(component)?;
    }
    Some(node)
}

/// Walk all but the last component, requiring each to already exist as
/// a directory. Returns `(parent, Some(existing_leaf))` or
/// `(parent, None)` if the leaf itself is missing. Fails with
/// `FsSkipArborescence` if any component before the leaf is missing.
fn split_parent<'a>(
    root: &'a FsEntry,
    components: &[String],
) -> Result<(&'a FsEntry, Option<&'a FsEntry>), ErrorKind> {
    let (parents, leaf) = components.split_at(components.len() - 1);
    let parent = get_node(root, parents)
        .ok_or_else(|| ErrorKind::FsSkipArborescence(components.join("/")))?;
    Ok((parent, parent.children.get(&leaf[0])))
}

fn adjust_ancestors(root: &mut FsEntry, parent_components: &[String], delta_size: i64, delta_count: i64) {
    apply_delta(root, delta_size, delta_count);
    let mut node = root;
    for component in parent_components {
        node = match node.children.get_mut(component) {
            Some(n) => n,
            None => return,
        };
        apply_delta(node, delta_size, delta_count);
    }
}

fn apply_delta(node: &mut FsEntry, delta_size: i64, delta_count: i64) {
    node.size = (node.size as i64 + delta_size).max(0) as u64;
    node.n_rec_children = (node.n_rec_children as i64 + delta_count).max(0) as u64;
}

fn insert_leaf(root: &mut FsEntry, components: &[String], new_entry: FsEntry) {
    let (parent_components, leaf_name) = components.split_at(components.len() - 1);
    let leaf_name = &leaf_name[0];

    let old = get_node_mut(root, parent_components)
        .and_then(|parent| parent.children.get(leaf_name))
        .cloned();

    let old_size = old.as_ref().map(|e| e.size as i64).unwrap_or(0);
    let old_count = old.as_ref().map(|e| e.n_rec_children as i64).unwrap_or(-1);
    let delta_size = new_entry.size as i64 - old_size;
    let delta_count = new_entry.n_rec_children as i64 - old_count;

    adjust_ancestors(root, parent_components, delta_size, delta_count);

    if let Some(parent) = get_node_mut(root, parent_components) {
        parent.children.insert(leaf_name.clone(), new_entry);
    }
}

fn remove_subtree(root: &mut FsEntry, components: &[String]) -> Option<FsEntry> {
    let (parent_components, leaf_name) = components.split_at(components.len() - 1);
    let leaf_name = &leaf_name[0];

    let removed = get_node_mut(root, parent_components)
        .and_then(|parent| parent.children.remove(leaf_name));

    if let Some(removed) = &removed {
        let delta_size = -(removed.size as i64);
        let delta_count = -(removed.n_rec_children as i64 + 1);
        adjust_ancestors(root, parent_components, delta_size, delta_count);
    }

    removed
}

fn walk_sorted(dir: &FsEntry, prefix: &str, out: &mut Vec<String>) {
    let mut names: Vec<&String> = dir.children.keys().filter(|n| !n.starts_with('.')).collect();
    names.sort();
    for name in names {
        let child = &dir.children[name];
        let rel = if prefix.is_empty() { name.clone() } else { format!("{prefix}/{name}") };
        if child.is_dir() {
            walk_sorted(child, &rel, out);
        } else {
            out.push(rel);
        }
    }
}

fn scan_dir(disk_path: &StdPath, entry: &mut FsEntry, base: &StdPath) -> anyhow::Result<()> {
    for item in fs::read_dir(disk_path).with_context(|| format!("reading dir {disk_path:?}"))? {
        let item = item?;
        let name = item.file_name().to_string_lossy().into_owned();
        if disk_path == base && name == TMP_DIR_NAME {
            continue;
        }
        let meta = match item.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("skipping {:?}, could not stat: {}", item.path(), e);
                continue;
            }
        };
        let status = Status::from_metadata(&meta);
        if meta.is_dir() {
            let mut child = FsEntry::new_dir(status);
            scan_dir(&item.path(), &mut child, base)?;
            entry.size += child.size;
            entry.n_rec_children += child.n_rec_children + 1;
            entry.children.insert(name, child);
        } else if meta.is_file() {
            let size = meta.len();
            entry.size += size;
            entry.n_rec_children += 1;
            entry.children.insert(name, FsEntry::new_file(size, status));
        }
    }
    Ok(())
}

fn remove_on_disk(path: &StdPath) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    fn user() -> &'static str {
        "tester"
    }

    #[test]
    fn scan_mkdir_rm_round_trip() {
        let dir = tempdir().unwrap();
        let cache = FsCache::new(dir.path().to_path_buf()).unwrap();

        let p = Path::parse("proj", user());
        cache.mkdir(&p).unwrap();
        assert!(cache.get_entry(&p).is_ok());

        cache.rm(&p).unwrap();
        assert!(cache.get_entry(&p).is_err());
    }

    #[test]
    fn mkdir_requires_existing_parent() {
        let dir = tempdir().unwrap();
        let cache = FsCache::new(dir.path().to_path_buf()).unwrap();
        let p = Path::parse("a/b", user());
        let err = cache.mkdir(&p).unwrap_err();
        assert!(matches!(err, ErrorKind::FsSkipArborescence(_)));
    }

    #[test]
    fn put_then_ls_then_get_aggregates_correctly() {
        let dir = tempdir().unwrap();
        let cache = FsCache::new(dir.path().to_path_buf()).unwrap();
        let p = Path::parse("data.bin", user());

        let mut tmp = cache.create_file(&p).unwrap();
        tmp.write_all(b"hello world").unwrap();
        cache.commit(tmp).unwrap();

        let snap = cache.get_entry(&p).unwrap();
        assert_eq!(snap.size, 11);

        let root_snap = cache.get_entry(&Path::empty_relative()).unwrap();
        assert_eq!(root_snap.size, 11);
        assert_eq!(root_snap.n_rec_children, 1);
    }

    #[test]
    fn committing_over_existing_file_keeps_aggregates_correct() {
        let dir = tempdir().unwrap();
        let cache = FsCache::new(dir.path().to_path_buf()).unwrap();
        let p = Path::parse("data.bin", user());

        let mut tmp = cache.create_file(&p).unwrap();
        tmp.write_all(b"12345").unwrap();
        cache.commit(tmp).unwrap();

        let mut tmp2 = cache.create_file(&p).unwrap();
        tmp2.write_all(b"1234567890").unwrap();
        cache.commit(tmp2).unwrap();

        let snap = cache.get_entry(&p).unwrap();
        assert_eq!(snap.size, 10);
        let root_snap = cache.get_entry(&Path::empty_relative()).unwrap();
        assert_eq!(root_snap.size, 10);
        assert_eq!(root_snap.n_rec_children, 1);
    }
}
