//! Overlay store: staged writes and removals merged with the real tree
//!
//! Pure state plus merged-view reads. All keys are normalized relative
//! paths (see crate::path); locking is the caller's responsibility.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fsutil;

/// In-memory overlay of pending writes and removals.
///
/// A path never appears in both `modified` and `removed_files`; a prefix in
/// `removed_dirs` shadows everything beneath it regardless of the other two
/// sets. BTree collections keep iteration order sorted, which makes diff
/// manifests deterministic.
#[derive(Debug, Default)]
pub struct OverlayStore {
    /// Staged file contents, keyed by normalized relative path
    modified: BTreeMap<String, Vec<u8>>,
    /// Staged single-file removals
    removed_files: BTreeSet<String>,
    /// Staged recursive directory removals, stored as trailing-slash prefixes
    removed_dirs: BTreeSet<String>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a file write. Clears any pending removal of the same path.
    pub fn stage_write(&mut self, path: &str, content: Vec<u8>) {
        self.modified.insert(path.to_string(), content);
        self.removed_files.remove(path);
    }

    /// Stage a single-file removal. Drops any pending write of the same path.
    pub fn stage_remove_file(&mut self, path: &str) {
        self.modified.remove(path);
        self.removed_files.insert(path.to_string());
    }

    /// Stage a recursive directory removal.
    ///
    /// `prefix` is the trailing-slash form ("" removes everything). Pending
    /// writes and file removals under the prefix become redundant and are
    /// purged before the prefix is recorded.
    pub fn stage_remove_dir(&mut self, prefix: &str) {
        self.modified.retain(|p, _| !p.starts_with(prefix));
        self.removed_files.retain(|p| !p.starts_with(prefix));
        self.removed_dirs.insert(prefix.to_string());
    }

    /// Whether a path is shadowed by a staged removal
    pub fn is_removed(&self, path: &str) -> bool {
        if self.removed_files.contains(path) {
            return true;
        }
        self.removed_dirs.iter().any(|dir| path.starts_with(dir.as_str()))
    }

    /// Replace the whole staged state, used when rehydrating from a diff
    pub(crate) fn restore(
        &mut self,
        modified: BTreeMap<String, Vec<u8>>,
        removed_files: BTreeSet<String>,
        removed_dirs: BTreeSet<String>,
    ) {
        self.modified = modified;
        self.removed_files = removed_files;
        self.removed_dirs = removed_dirs;
    }

    /// Drop all staged changes
    pub fn discard(&mut self) {
        self.modified.clear();
        self.removed_files.clear();
        self.removed_dirs.clear();
    }

    /// Whether no changes are staged
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty()
            && self.removed_files.is_empty()
            && self.removed_dirs.is_empty()
    }

    pub fn modified(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.modified
    }

    pub fn removed_files(&self) -> &BTreeSet<String> {
        &self.removed_files
    }

    pub fn removed_dirs(&self) -> &BTreeSet<String> {
        &self.removed_dirs
    }

    /// Resolve a normalized relative path against the real tree root
    pub fn abs_path(root: &Path, path: &str) -> PathBuf {
        if path.is_empty() {
            root.to_path_buf()
        } else {
            root.join(path)
        }
    }

    /// Read a file through the merged view.
    ///
    /// Precedence: staged write, then staged removal (None), then the real
    /// tree. Returns None if the path resolves nowhere.
    pub fn read_merged(&self, root: &Path, path: &str) -> Result<Option<Vec<u8>>> {
        if let Some(content) = self.modified.get(path) {
            return Ok(Some(content.clone()));
        }
        if self.is_removed(path) {
            return Ok(None);
        }
        let fp = Self::abs_path(root, path);
        if fp.is_file() {
            return fsutil::read_file(&fp).map(Some);
        }
        Ok(None)
    }

    /// Whether a path resolves to a file in the merged view
    pub fn file_exists(&self, root: &Path, path: &str) -> bool {
        if self.modified.contains_key(path) {
            true
        } else if self.is_removed(path) {
            false
        } else {
            Self::abs_path(root, path).is_file()
        }
    }

    /// List subdirectory names of `prefix` (trailing-slash form) in the
    /// merged view: real directories not shadowed by removal, plus parent
    /// directories implied by staged writes.
    pub fn list_dirs(&self, root: &Path, prefix: &str) -> Vec<String> {
        let mut names = BTreeSet::new();

        if let Ok(entries) = fs::read_dir(Self::abs_path(root, prefix.trim_end_matches('/'))) {
            for entry in entries.flatten() {
                if !entry.path().is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if !self.is_removed(&format!("{}{}/", prefix, name)) {
                    names.insert(name);
                }
            }
        }

        for path in self.modified.keys() {
            if let Some(rel) = path.strip_prefix(prefix) {
                let segments: Vec<&str> = rel.split('/').collect();
                if segments.len() > 1 {
                    names.insert(segments[0].to_string());
                }
            }
        }

        names.into_iter().collect()
    }

    /// List file names directly under `prefix` (trailing-slash form) in the
    /// merged view
    pub fn list_files(&self, root: &Path, prefix: &str) -> Vec<String> {
        let mut names = BTreeSet::new();

        if let Ok(entries) = fs::read_dir(Self::abs_path(root, prefix.trim_end_matches('/'))) {
            for entry in entries.flatten() {
                if !entry.path().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if !self.is_removed(&format!("{}{}", prefix, name)) {
                    names.insert(name);
                }
            }
        }

        for path in self.modified.keys() {
            if let Some(rel) = path.strip_prefix(prefix) {
                let segments: Vec<&str> = rel.split('/').collect();
                if segments.len() == 1 {
                    names.insert(segments[0].to_string());
                }
            }
        }

        names.into_iter().collect()
    }
}
