//! Raw file I/O helpers
//!
//! Thin wrappers over std::fs that attach path context to errors.
//! All writes create missing parent directories first.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read the entire content of a file
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::io(path, e))
}

/// Write a file, creating missing parent directories
pub fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        make_path(parent)?;
    }
    fs::write(path, content).map_err(|e| Error::io(path, e))
}

/// Remove a single file
pub fn remove_file(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|e| Error::io(path, e))
}

/// Remove a directory and everything beneath it
pub fn remove_dir_recursively(path: &Path) -> Result<()> {
    fs::remove_dir_all(path).map_err(|e| Error::io(path, e))
}

/// Create a directory and all missing parents
pub fn make_path(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::io(path, e))
}
