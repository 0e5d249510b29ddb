//! Transactional filesystem
//!
//! Buffers writes and removals in an overlay over a real directory tree and
//! persists them through a crash-safe, diff-log-based save protocol. A save
//! interrupted at any point is recovered on the next open by replaying the
//! backup diff; periodic autosaves checkpoint unsaved work the same way.

use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::archive::{ZipReader, ZipWriter, ZIP_ENTRY_MODE};
use crate::diff::{self, DiffType, JsonFormat};
use crate::error::{Error, Result};
use crate::fsutil;
use crate::lock::{DirectoryLock, LockHandler, LOCK_FILE_NAME};
use crate::overlay::OverlayStore;
use crate::path::{dir_prefix, normalize};

/// Decision source for restoring an autosave diff found at open time
pub enum RestoreMode<'a> {
    /// Leave the autosave on disk untouched
    Never,
    /// Restore it unconditionally
    Always,
    /// Ask the callback; restore when it returns true
    Ask(&'a dyn Fn(&Path) -> bool),
}

/// Options for opening a transactional filesystem
pub struct OpenOptions<'a> {
    /// Whether mutations may be persisted; also controls lock acquisition
    pub writable: bool,
    /// How to handle a complete autosave diff
    pub restore: RestoreMode<'a>,
    /// Consulted when the directory lock is held by a live foreign process
    pub lock_handler: Option<LockHandler<'a>>,
}

impl Default for OpenOptions<'_> {
    fn default() -> Self {
        Self { writable: false, restore: RestoreMode::Never, lock_handler: None }
    }
}

/// Per-file predicate applied during archive export
pub type FileFilter<'a> = &'a dyn Fn(&str) -> bool;

struct Inner {
    store: OverlayStore,
    writable: bool,
    restored_from_autosave: bool,
    lock: DirectoryLock,
}

/// Transactional overlay over one root directory.
///
/// All state is guarded by a single mutex held for the full duration of
/// every operation, including the disk I/O of save, autosave and archive
/// export. Callbacks supplied to export must not call back into the same
/// instance, or they will deadlock.
pub struct TransactionalFs {
    root: PathBuf,
    inner: Mutex<Inner>,
}

impl TransactionalFs {
    /// Open a root directory.
    ///
    /// Recovery runs first: a complete backup diff (left behind by an
    /// interrupted save) is restored unconditionally. The directory lock is
    /// then acquired when opening writable, and finally a complete autosave
    /// diff is offered according to the restore mode.
    pub fn open(root: impl AsRef<Path>, options: OpenOptions<'_>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut store = OverlayStore::new();
        let mut lock = DirectoryLock::new(&root);

        if diff::is_complete(&root, DiffType::Backup) {
            let manifest = diff::manifest_path(&root, DiffType::Backup);
            debug!(path = %manifest.display(), "restoring file system from backup");
            diff::read_diff(&manifest, DiffType::Backup, &mut store, &JsonFormat)?;
        }

        if options.writable {
            fsutil::make_path(&root)?;
            lock.try_lock(options.lock_handler)?;
        }

        let mut restored_from_autosave = false;
        if diff::is_complete(&root, DiffType::Autosave) {
            let accept = match options.restore {
                RestoreMode::Never => false,
                RestoreMode::Always => true,
                RestoreMode::Ask(callback) => callback(&root),
            };
            if accept {
                let manifest = diff::manifest_path(&root, DiffType::Autosave);
                debug!(path = %manifest.display(), "restoring file system from autosave");
                diff::read_diff(&manifest, DiffType::Autosave, &mut store, &JsonFormat)?;
                restored_from_autosave = true;
            }
        }

        Ok(Self {
            root,
            inner: Mutex::new(Inner {
                store,
                writable: options.writable,
                restored_from_autosave,
                lock,
            }),
        })
    }

    /// Open read-only, never restoring an autosave
    pub fn open_ro(root: impl AsRef<Path>) -> Result<Self> {
        Self::open(root, OpenOptions::default())
    }

    /// Open writable with the given autosave restore mode
    pub fn open_rw(root: impl AsRef<Path>, restore: RestoreMode<'_>) -> Result<Self> {
        Self::open(root, OpenOptions { writable: true, restore, lock_handler: None })
    }

    /// Root directory of this filesystem
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path a relative path resolves to in the real tree
    pub fn abs_path(&self, path: &str) -> PathBuf {
        OverlayStore::abs_path(&self.root, &normalize(path))
    }

    pub fn is_writable(&self) -> bool {
        self.inner.lock().writable
    }

    /// Whether the overlay was rehydrated from an autosave diff and not yet
    /// saved
    pub fn is_restored_from_autosave(&self) -> bool {
        self.inner.lock().restored_from_autosave
    }

    /// Read a file through the merged view
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.read_if_exists(path)?
            .ok_or_else(|| Error::FileNotFound(self.abs_path(path).display().to_string()))
    }

    /// Read a file through the merged view, None if it resolves nowhere
    pub fn read_if_exists(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let cleaned = normalize(path);
        self.inner.lock().store.read_merged(&self.root, &cleaned)
    }

    /// Whether a path resolves to a file in the merged view
    pub fn file_exists(&self, path: &str) -> bool {
        let cleaned = normalize(path);
        self.inner.lock().store.file_exists(&self.root, &cleaned)
    }

    /// Stage a file write
    pub fn write(&self, path: &str, content: &[u8]) {
        let cleaned = normalize(path);
        self.inner.lock().store.stage_write(&cleaned, content.to_vec());
    }

    /// Stage a single-file removal
    pub fn remove_file(&self, path: &str) {
        let cleaned = normalize(path);
        self.inner.lock().store.stage_remove_file(&cleaned);
    }

    /// Stage removal of a directory and everything beneath it
    pub fn remove_dir_recursively(&self, path: &str) {
        let prefix = dir_prefix(path);
        self.inner.lock().store.stage_remove_dir(&prefix);
    }

    /// Stage a rename: write the destination with the source content, then
    /// remove the source. Fails if the source does not resolve.
    pub fn rename_file(&self, src: &str, dst: &str) -> Result<()> {
        let content = self.read(src)?;
        self.write(dst, &content);
        self.remove_file(src);
        Ok(())
    }

    /// Subdirectory names under `path` in the merged view
    pub fn list_dirs(&self, path: &str) -> Vec<String> {
        let prefix = dir_prefix(path);
        self.inner.lock().store.list_dirs(&self.root, &prefix)
    }

    /// File names directly under `path` in the merged view
    pub fn list_files(&self, path: &str) -> Vec<String> {
        let prefix = dir_prefix(path);
        self.inner.lock().store.list_files(&self.root, &prefix)
    }

    /// Drop all staged changes
    pub fn discard_changes(&self) {
        self.inner.lock().store.discard();
    }

    /// Staged paths whose staged state actually differs from the real tree
    pub fn check_for_modifications(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let mut modifications = Vec::new();

        for dir in inner.store.removed_dirs() {
            let fp = OverlayStore::abs_path(&self.root, dir.trim_end_matches('/'));
            if fp.is_dir() {
                modifications.push(dir.clone());
            }
        }
        for path in inner.store.removed_files() {
            if OverlayStore::abs_path(&self.root, path).is_file() {
                modifications.push(path.clone());
            }
        }
        for (path, content) in inner.store.modified() {
            let fp = OverlayStore::abs_path(&self.root, path);
            if !fp.is_file() || &fsutil::read_file(&fp)? != content {
                modifications.push(path.clone());
            }
        }

        Ok(modifications)
    }

    /// Persist an autosave diff of the current overlay.
    ///
    /// Never touches the real tree and never clears the overlay; produces a
    /// recovery checkpoint for unsaved edits.
    pub fn autosave(&self) -> Result<()> {
        let inner = self.inner.lock();
        Self::save_diff(&self.root, &inner, DiffType::Autosave)
    }

    /// Commit all staged changes to the real tree.
    ///
    /// A backup diff is written first and removed only after every real-tree
    /// operation succeeded, so an interruption at any point is recovered by
    /// replaying the backup on the next open. On failure the staged overlay
    /// and the backup diff are left in place for retry.
    pub fn save(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        // Write-ahead snapshot; must fully succeed before the tree changes.
        Self::save_diff(&self.root, &inner, DiffType::Backup)?;

        // The staged state is now backed up, so a restored autosave can no
        // longer be lost.
        inner.restored_from_autosave = false;

        // The autosave is older than the backup now; drop it so it cannot
        // be restored over newer state.
        diff::remove_diff(&self.root, DiffType::Autosave)?;

        // Apply to the real tree: directories, then files, then writes, so
        // a directory removal cannot undo a write staged beneath it.
        for dir in inner.store.removed_dirs() {
            let fp = OverlayStore::abs_path(&self.root, dir.trim_end_matches('/'));
            if fp.is_dir() {
                fsutil::remove_dir_recursively(&fp)?;
            }
        }
        for path in inner.store.removed_files() {
            let fp = OverlayStore::abs_path(&self.root, path);
            if fp.is_file() {
                fsutil::remove_file(&fp)?;
            }
        }
        for (path, content) in inner.store.modified() {
            fsutil::write_file(&OverlayStore::abs_path(&self.root, path), content)?;
        }

        // The real tree matches the intended state; the backup is redundant.
        diff::remove_diff(&self.root, DiffType::Backup)?;

        inner.store.discard();
        Ok(())
    }

    /// Make the instance read-only and release the directory lock
    pub fn release_lock(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.writable = false;
        inner.lock.unlock_if_held()
    }

    fn save_diff(root: &Path, inner: &Inner, ty: DiffType) -> Result<()> {
        if !inner.writable {
            return Err(Error::ReadOnly);
        }
        diff::write_diff(root, ty, &inner.store, &JsonFormat)
    }

    /// Stage every non-directory entry of an archive into the overlay
    pub fn load_from_zip(&self, data: Vec<u8>) -> Result<()> {
        let reader = ZipReader::from_bytes(data)?;
        self.stage_archive(reader)
    }

    /// Stage every non-directory entry of an archive file into the overlay
    pub fn load_from_zip_file(&self, path: &Path) -> Result<()> {
        let reader = ZipReader::open(path)?;
        self.stage_archive(reader)
    }

    fn stage_archive<R: std::io::Read + Seek>(&self, mut reader: ZipReader<R>) -> Result<()> {
        let mut inner = self.inner.lock();
        for index in 0..reader.entry_count() {
            let name = reader.entry_name(index)?;
            if name.ends_with('/') || name.ends_with('\\') {
                continue;
            }
            let bytes = reader.entry_bytes(index)?;
            inner.store.stage_write(&normalize(&name), bytes);
        }
        Ok(())
    }

    /// Export the merged view as an in-memory archive.
    ///
    /// Dot-directories (diff logs and friends) and the lock file are always
    /// excluded; the optional filter further restricts files by path.
    pub fn export_to_zip(&self, filter: Option<FileFilter<'_>>) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        let mut zip = ZipWriter::in_memory();
        self.export_dir(&inner, &mut zip, None, "", filter)?;
        zip.finish_into_bytes()
    }

    /// Export the merged view as an archive file.
    ///
    /// If the output path lies inside this tree it is excluded from the
    /// export. A partially written output file is deleted before any error
    /// propagates.
    pub fn export_to_zip_file(&self, path: &Path, filter: Option<FileFilter<'_>>) -> Result<()> {
        let skip = path
            .strip_prefix(&self.root)
            .ok()
            .map(|rel| normalize(&rel.to_string_lossy()));

        let result = (|| {
            let mut zip = ZipWriter::create(path)?;
            let inner = self.inner.lock();
            self.export_dir(&inner, &mut zip, skip.as_deref(), "", filter)?;
            zip.finish()
        })();

        if result.is_err() {
            // the archive is incomplete, do not leave it behind
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove partial archive");
            }
        }
        result
    }

    fn export_dir<W: Write + Seek>(
        &self,
        inner: &Inner,
        zip: &mut ZipWriter<W>,
        skip: Option<&str>,
        prefix: &str,
        filter: Option<FileFilter<'_>>,
    ) -> Result<()> {
        for dirname in inner.store.list_dirs(&self.root, prefix) {
            // diff logs, lock-adjacent and VCS directories stay out
            if dirname.starts_with('.') {
                continue;
            }
            self.export_dir(inner, zip, skip, &format!("{}{}/", prefix, dirname), filter)?;
        }

        for filename in inner.store.list_files(&self.root, prefix) {
            let filepath = format!("{}{}", prefix, filename);
            if skip == Some(filepath.as_str()) {
                continue;
            }
            if filename == LOCK_FILE_NAME {
                continue;
            }
            if let Some(predicate) = filter {
                if !predicate(&filepath) {
                    continue;
                }
            }
            let content = inner
                .store
                .read_merged(&self.root, &filepath)?
                .ok_or_else(|| Error::FileNotFound(filepath.clone()))?;
            zip.write_entry(&filepath, &content, ZIP_ENTRY_MODE)?;
        }

        Ok(())
    }
}

impl Drop for TransactionalFs {
    fn drop(&mut self) {
        // A gracefully closed writable filesystem no longer needs its
        // autosave. Keep it when read-only, and when an autosave was
        // restored but never saved, so the edits it represents survive.
        let inner = self.inner.get_mut();
        if inner.writable && !inner.restored_from_autosave {
            if let Err(e) = diff::remove_diff(&self.root, DiffType::Autosave) {
                warn!(root = %self.root.display(), error = %e, "failed to remove autosave diff");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn tree_snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap().flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let rel = path.strip_prefix(root).unwrap().to_string_lossy().to_string();
                    files.push((rel, fs::read(&path).unwrap()));
                }
            }
        }
        files.sort();
        files
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempdir().unwrap();
        {
            let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
            fs.write("a/b.txt", b"content");
            fs.save().unwrap();
        }

        let fs = TransactionalFs::open_ro(dir.path()).unwrap();
        assert_eq!(fs.read("a/b.txt").unwrap(), b"content");
        assert!(!dir.path().join(".backup").exists());
        assert!(!dir.path().join(".autosave").exists());
    }

    #[test]
    fn test_idempotent_save() {
        let dir = tempdir().unwrap();
        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        fs.write("a.txt", b"1");
        fs.save().unwrap();
        let before = tree_snapshot(dir.path());

        fs.save().unwrap();
        assert_eq!(tree_snapshot(dir.path()), before);
        assert!(!dir.path().join(".backup").exists());
        assert!(!dir.path().join(".autosave").exists());
    }

    #[test]
    fn test_crash_before_apply_is_recovered() {
        let dir = tempdir().unwrap();
        {
            let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
            fs.write("f", b"intended");
            // save() interrupted right after the backup diff was written
            let inner = fs.inner.lock();
            TransactionalFs::save_diff(&fs.root, &inner, DiffType::Backup).unwrap();
        }
        assert!(!dir.path().join("f").exists());

        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        assert_eq!(fs.read("f").unwrap(), b"intended");

        // retrying the save completes the interrupted commit
        fs.save().unwrap();
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"intended");
        assert!(!dir.path().join(".backup").exists());
    }

    #[test]
    fn test_failed_apply_keeps_backup_and_overlay_for_retry() {
        let dir = tempdir().unwrap();
        // a regular file where a staged write needs a directory makes the
        // apply step fail, independent of permission bits
        fs::write(dir.path().join("obstacle"), b"in the way").unwrap();

        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        fs.write("ok.txt", b"fine");
        fs.write("obstacle/blocked.txt", b"blocked");
        assert!(matches!(fs.save(), Err(Error::Io { .. })));

        // the backup written ahead of the apply must survive the failure,
        // and the overlay stays staged
        assert!(diff::is_complete(dir.path(), DiffType::Backup));
        assert_eq!(fs.read("obstacle/blocked.txt").unwrap(), b"blocked");
        assert_eq!(fs.read("ok.txt").unwrap(), b"fine");

        // clearing the obstruction lets a retry complete the commit
        fs::remove_file(dir.path().join("obstacle")).unwrap();
        fs.save().unwrap();
        assert_eq!(fs::read(dir.path().join("obstacle/blocked.txt")).unwrap(), b"blocked");
        assert_eq!(fs::read(dir.path().join("ok.txt")).unwrap(), b"fine");
        assert!(!dir.path().join(".backup").exists());
    }

    #[test]
    fn test_recovery_restores_removals_too() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("doomed.txt"), b"x").unwrap();
        {
            let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
            fs.remove_file("doomed.txt");
            let inner = fs.inner.lock();
            TransactionalFs::save_diff(&fs.root, &inner, DiffType::Backup).unwrap();
        }

        let fs = TransactionalFs::open_ro(dir.path()).unwrap();
        assert!(!fs.file_exists("doomed.txt"));
        // real file still present until the save is retried
        assert!(dir.path().join("doomed.txt").is_file());
    }

    #[test]
    fn test_autosave_is_non_destructive() {
        let dir = tempdir().unwrap();
        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        fs.write("f", b"draft");
        fs.autosave().unwrap();

        assert!(!dir.path().join("f").exists());
        assert_eq!(fs.read("f").unwrap(), b"draft");
        assert!(diff::is_complete(dir.path(), DiffType::Autosave));
    }

    #[test]
    fn test_autosave_removed_on_clean_close() {
        let dir = tempdir().unwrap();
        {
            let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
            fs.write("f", b"draft");
            fs.autosave().unwrap();
        }
        assert!(!diff::is_complete(dir.path(), DiffType::Autosave));
        assert!(!dir.path().join(".autosave").exists());
    }

    fn leave_autosave_behind(root: &Path) {
        let mut store = OverlayStore::new();
        store.stage_write("draft.txt", b"unsaved".to_vec());
        diff::write_diff(root, DiffType::Autosave, &store, &JsonFormat).unwrap();
    }

    #[test]
    fn test_read_only_close_preserves_autosave() {
        let dir = tempdir().unwrap();
        leave_autosave_behind(dir.path());
        {
            let fs = TransactionalFs::open_ro(dir.path()).unwrap();
            // restore declined; the diff must stay untouched
            assert!(!fs.file_exists("draft.txt"));
        }
        assert!(diff::is_complete(dir.path(), DiffType::Autosave));
    }

    #[test]
    fn test_restored_but_unsaved_autosave_is_preserved() {
        let dir = tempdir().unwrap();
        leave_autosave_behind(dir.path());
        {
            let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Always).unwrap();
            assert!(fs.is_restored_from_autosave());
            assert_eq!(fs.read("draft.txt").unwrap(), b"unsaved");
        }
        assert!(diff::is_complete(dir.path(), DiffType::Autosave));
    }

    #[test]
    fn test_saving_restored_autosave_discards_it() {
        let dir = tempdir().unwrap();
        leave_autosave_behind(dir.path());
        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Always).unwrap();
        fs.save().unwrap();

        assert!(!fs.is_restored_from_autosave());
        assert!(!diff::is_complete(dir.path(), DiffType::Autosave));
        assert_eq!(fs::read(dir.path().join("draft.txt")).unwrap(), b"unsaved");
    }

    #[test]
    fn test_restore_callback_decides() {
        let dir = tempdir().unwrap();
        leave_autosave_behind(dir.path());

        let declined =
            TransactionalFs::open_rw(dir.path(), RestoreMode::Ask(&|_| false)).unwrap();
        assert!(!declined.file_exists("draft.txt"));
        // declined restores leave the diff on disk for the next open
        assert!(diff::is_complete(dir.path(), DiffType::Autosave));
        declined.release_lock().unwrap();

        leave_autosave_behind(dir.path());
        let accepted =
            TransactionalFs::open_rw(dir.path(), RestoreMode::Ask(&|_| true)).unwrap();
        assert_eq!(accepted.read("draft.txt").unwrap(), b"unsaved");
    }

    #[test]
    fn test_persistence_requires_writable() {
        let dir = tempdir().unwrap();
        let fs = TransactionalFs::open_ro(dir.path()).unwrap();
        fs.write("a.txt", b"in memory only");
        assert!(matches!(fs.save(), Err(Error::ReadOnly)));
        assert!(matches!(fs.autosave(), Err(Error::ReadOnly)));
    }

    #[test]
    fn test_save_applies_removals_before_writes() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/old.txt"), b"old").unwrap();

        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        fs.remove_dir_recursively("a");
        fs.write("a/new.txt", b"new");
        fs.save().unwrap();

        assert!(!dir.path().join("a/old.txt").exists());
        assert_eq!(fs::read(dir.path().join("a/new.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_rename_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("src.txt"), b"payload").unwrap();

        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        fs.rename_file("src.txt", "dst.txt").unwrap();
        assert!(!fs.file_exists("src.txt"));
        assert_eq!(fs.read("dst.txt").unwrap(), b"payload");

        assert!(matches!(
            fs.rename_file("missing.txt", "other.txt"),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let fs = TransactionalFs::open_ro(dir.path()).unwrap();
        assert!(matches!(fs.read("nope.txt"), Err(Error::FileNotFound(_))));
        assert!(fs.read_if_exists("nope.txt").unwrap().is_none());
    }

    #[test]
    fn test_second_writable_open_is_locked_out() {
        let dir = tempdir().unwrap();
        let _first = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        assert!(matches!(
            TransactionalFs::open_rw(dir.path(), RestoreMode::Never),
            Err(Error::Locked { .. })
        ));
        // read-only opens ignore the lock
        TransactionalFs::open_ro(dir.path()).unwrap();
    }

    #[test]
    fn test_release_lock_makes_read_only() {
        let dir = tempdir().unwrap();
        let first = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        first.release_lock().unwrap();
        assert!(!first.is_writable());
        assert!(matches!(first.save(), Err(Error::ReadOnly)));

        TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
    }

    #[test]
    fn test_check_for_modifications() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("same.txt"), b"same").unwrap();
        fs::write(dir.path().join("gone.txt"), b"x").unwrap();

        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        fs.write("same.txt", b"same");
        fs.write("new.txt", b"new");
        fs.remove_file("gone.txt");

        let mods = fs.check_for_modifications().unwrap();
        assert!(mods.contains(&"new.txt".to_string()));
        assert!(mods.contains(&"gone.txt".to_string()));
        assert!(!mods.contains(&"same.txt".to_string()));
    }

    #[test]
    fn test_zip_round_trip_excludes_internals() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("top.txt"), b"top").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/inner.txt"), b"inner").unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/config"), b"secret").unwrap();

        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        fs.write("staged.txt", b"staged");
        fs.autosave().unwrap();
        let bytes = fs.export_to_zip(None).unwrap();

        let other = tempdir().unwrap();
        let imported = TransactionalFs::open_ro(other.path()).unwrap();
        imported.load_from_zip(bytes).unwrap();

        assert_eq!(imported.read("top.txt").unwrap(), b"top");
        assert_eq!(imported.read("sub/inner.txt").unwrap(), b"inner");
        assert_eq!(imported.read("staged.txt").unwrap(), b"staged");
        // dot-directories, diff logs and the lock file never export
        assert!(!imported.file_exists(".git/config"));
        assert!(!imported.file_exists(".lock"));
        assert!(imported.list_dirs("").iter().all(|d| !d.starts_with('.')));
    }

    #[test]
    fn test_zip_export_applies_filter() {
        let dir = tempdir().unwrap();
        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        fs.write("keep.txt", b"1");
        fs.write("drop.bin", b"2");

        let bytes = fs.export_to_zip(Some(&|path: &str| path.ends_with(".txt"))).unwrap();

        let other = tempdir().unwrap();
        let imported = TransactionalFs::open_ro(other.path()).unwrap();
        imported.load_from_zip(bytes).unwrap();
        assert!(imported.file_exists("keep.txt"));
        assert!(!imported.file_exists("drop.bin"));
    }

    #[test]
    fn test_zip_export_to_file_skips_itself() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("data.txt"), b"data").unwrap();

        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        let out = dir.path().join("export.zip");
        fs.export_to_zip_file(&out, None).unwrap();

        let mut reader = ZipReader::open(&out).unwrap();
        let names: Vec<String> =
            (0..reader.entry_count()).map(|i| reader.entry_name(i).unwrap()).collect();
        assert!(names.contains(&"data.txt".to_string()));
        assert!(!names.contains(&"export.zip".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_zip_export_failure_removes_partial_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ok.txt"), b"1").unwrap();
        fs::write(dir.path().join("broken.txt"), b"2").unwrap();
        // uid 0 bypasses permission checks, so the failure cannot be staged
        if is_root() {
            return;
        }
        fs::set_permissions(
            dir.path().join("broken.txt"),
            fs::Permissions::from_mode(0o000),
        )
        .unwrap();

        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        let out = dir.path().join("export.zip");
        assert!(fs.export_to_zip_file(&out, None).is_err());
        assert!(!out.exists());
    }

    #[cfg(unix)]
    fn is_root() -> bool {
        std::fs::read_to_string("/proc/self/status")
            .map(|s| s.lines().any(|l| l.starts_with("Uid:\t0\t")))
            .unwrap_or(false)
    }

    #[test]
    fn test_discard_changes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), b"real").unwrap();

        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        fs.write("staged.txt", b"x");
        fs.remove_file("real.txt");
        fs.discard_changes();

        assert!(!fs.file_exists("staged.txt"));
        assert_eq!(fs.read("real.txt").unwrap(), b"real");
    }

    #[test]
    fn test_paths_normalize_to_identical_keys() {
        let dir = tempdir().unwrap();
        let fs = TransactionalFs::open_rw(dir.path(), RestoreMode::Never).unwrap();
        fs.write("a\\b//c.txt", b"x");
        assert_eq!(fs.read(" a/b/c.txt ").unwrap(), b"x");
    }
}
