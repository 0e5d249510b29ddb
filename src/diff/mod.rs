//! Diff log codec
//!
//! Persists the overlay as a diff: a timestamp-named snapshot directory of
//! modified file copies plus a manifest listing all staged changes. Two
//! diff types exist: the backup written at the start of every save, and the
//! periodic autosave checkpoint.

mod manifest;

pub use manifest::{DiffManifest, JsonFormat, ManifestFormat};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fsutil;
use crate::overlay::OverlayStore;

/// Strftime pattern for snapshot directory names: sortable, millisecond
/// resolution, filesystem-safe
const SNAPSHOT_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S-%3f";

/// The two kinds of persisted diffs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Write-ahead snapshot taken at the start of save(), removed only
    /// after the real tree fully matches the intended state
    Backup,
    /// Periodic checkpoint of unsaved edits, independent of save()
    Autosave,
}

impl DiffType {
    /// Dot-directory under the filesystem root holding this diff
    pub fn dir_name(&self) -> &'static str {
        match self {
            DiffType::Backup => ".backup",
            DiffType::Autosave => ".autosave",
        }
    }

    /// Manifest file name inside the diff directory
    pub fn manifest_name(&self) -> &'static str {
        match self {
            DiffType::Backup => "backup.json",
            DiffType::Autosave => "autosave.json",
        }
    }

    /// Type tag stored in the manifest
    pub fn type_tag(&self) -> &'static str {
        match self {
            DiffType::Backup => "txfs_backup",
            DiffType::Autosave => "txfs_autosave",
        }
    }
}

/// Absolute path of the manifest file for a diff type
pub fn manifest_path(root: &Path, ty: DiffType) -> PathBuf {
    root.join(ty.dir_name()).join(ty.manifest_name())
}

/// Whether a complete diff of the given type exists.
///
/// The manifest is written last and deleted first, so its presence is the
/// sole completeness signal.
pub fn is_complete(root: &Path, ty: DiffType) -> bool {
    manifest_path(root, ty).is_file()
}

/// Persist the overlay as a diff of the given type.
///
/// Writes every modified file into a fresh timestamp-named snapshot
/// directory, then writes the manifest as the final artifact.
pub fn write_diff(
    root: &Path,
    ty: DiffType,
    store: &OverlayStore,
    format: &dyn ManifestFormat,
) -> Result<()> {
    let now = Local::now();
    let dir = root.join(ty.dir_name());
    let files_dir_name = now.format(SNAPSHOT_DIR_FORMAT).to_string();
    let files_dir = dir.join(&files_dir_name);

    for (path, content) in store.modified() {
        fsutil::write_file(&files_dir.join(path), content)?;
    }

    let manifest = DiffManifest {
        type_tag: ty.type_tag().to_string(),
        created: now,
        modified_files_directory: files_dir_name,
        modified_files: store.modified().keys().cloned().collect(),
        removed_files: store.removed_files().iter().cloned().collect(),
        removed_directories: store.removed_dirs().iter().cloned().collect(),
    };

    let index = manifest_path(root, ty);
    let bytes = format
        .encode(&manifest)
        .map_err(|reason| Error::ManifestCorrupt { path: index.clone(), reason })?;

    // Writing the manifest must be the last operation so an interrupted
    // diff is never mistaken for a complete one.
    fsutil::write_file(&index, &bytes)?;
    debug!(diff = ty.type_tag(), path = %index.display(), "diff written");
    Ok(())
}

/// Rebuild the overlay from a persisted diff manifest.
///
/// Discards the current overlay first. Modified file contents are read
/// back from the snapshot directory; a missing snapshot file is an I/O
/// error, a malformed manifest is ManifestCorrupt.
pub fn read_diff(
    manifest_file: &Path,
    ty: DiffType,
    store: &mut OverlayStore,
    format: &dyn ManifestFormat,
) -> Result<()> {
    store.discard();

    let bytes = fsutil::read_file(manifest_file)?;
    let manifest = format.decode(&bytes).map_err(|reason| Error::ManifestCorrupt {
        path: manifest_file.to_path_buf(),
        reason,
    })?;
    if manifest.type_tag != ty.type_tag() {
        return Err(Error::ManifestCorrupt {
            path: manifest_file.to_path_buf(),
            reason: format!(
                "unexpected type tag '{}', expected '{}'",
                manifest.type_tag,
                ty.type_tag()
            ),
        });
    }

    let files_dir = manifest_file
        .parent()
        .unwrap_or(Path::new(""))
        .join(&manifest.modified_files_directory);

    let mut modified = BTreeMap::new();
    for path in &manifest.modified_files {
        let content = fsutil::read_file(&files_dir.join(path))?;
        modified.insert(path.clone(), content);
    }
    let removed_files: BTreeSet<String> = manifest.removed_files.iter().cloned().collect();
    let removed_dirs: BTreeSet<String> = manifest.removed_directories.iter().cloned().collect();

    store.restore(modified, removed_files, removed_dirs);
    debug!(diff = ty.type_tag(), path = %manifest_file.display(), "diff loaded");
    Ok(())
}

/// Delete a persisted diff.
///
/// The manifest goes first, atomically marking the diff incomplete; a crash
/// between the two deletions leaves a directory that the completeness probe
/// correctly ignores.
pub fn remove_diff(root: &Path, ty: DiffType) -> Result<()> {
    let index = manifest_path(root, ty);
    if index.is_file() {
        fsutil::remove_file(&index)?;
    }
    let dir = root.join(ty.dir_name());
    if dir.is_dir() {
        fsutil::remove_dir_recursively(&dir)?;
    }
    Ok(())
}
