//! Diff manifest data model and serialization seam
//!
//! The manifest is the index of a persisted diff. Its presence on disk is
//! the sole signal that the diff is complete, so the codec writes it last
//! and deletes it first. The grammar sits behind ManifestFormat so the
//! codec can be tested against an in-memory fake.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Index of one persisted diff (backup or autosave)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffManifest {
    /// Type tag, e.g. "txfs_backup"
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Creation time of the diff
    pub created: DateTime<Local>,
    /// Name of the snapshot subdirectory holding the modified file copies
    pub modified_files_directory: String,
    /// Modified file paths, sorted lexicographically
    pub modified_files: Vec<String>,
    /// Removed file paths, sorted lexicographically
    pub removed_files: Vec<String>,
    /// Removed directory prefixes (trailing slash), sorted lexicographically
    pub removed_directories: Vec<String>,
}

/// Serialization grammar for diff manifests.
///
/// Errors are plain reason strings; the codec attaches the manifest path
/// when mapping them to Error::ManifestCorrupt.
pub trait ManifestFormat {
    fn encode(&self, manifest: &DiffManifest) -> Result<Vec<u8>, String>;
    fn decode(&self, bytes: &[u8]) -> Result<DiffManifest, String>;
}

/// JSON manifest grammar
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

impl ManifestFormat for JsonFormat {
    fn encode(&self, manifest: &DiffManifest) -> Result<Vec<u8>, String> {
        serde_json::to_vec_pretty(manifest).map_err(|e| e.to_string())
    }

    fn decode(&self, bytes: &[u8]) -> Result<DiffManifest, String> {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    }
}
