//! Error types for txfs

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for txfs operations
#[derive(Debug, Error)]
pub enum Error {
    /// A read targeted a path that does not exist in the merged view
    #[error("File '{0}' does not exist")]
    FileNotFound(String),

    /// A persistence operation was attempted on a read-only filesystem
    #[error("File system is read-only")]
    ReadOnly,

    /// An underlying filesystem operation failed
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A diff manifest could not be parsed or is missing required fields
    #[error("Corrupt diff manifest '{path}': {reason}")]
    ManifestCorrupt { path: PathBuf, reason: String },

    /// The directory lock is held by another process
    #[error("Directory '{path}' is locked by {holder}")]
    Locked { path: PathBuf, holder: String },

    /// Archive encoding or decoding failed
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl Error {
    /// Attach path context to an I/O error
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
