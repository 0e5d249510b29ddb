//! Zip archive collaborators
//!
//! Thin wrappers over the zip crate exposing just the entry-level surface
//! the archive bridge needs. Entry names use forward slashes; directory
//! entries are never materialized.

use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;

use crate::error::{Error, Result};

/// Permission mode applied to every exported entry
pub const ZIP_ENTRY_MODE: u32 = 0o644;

/// Reader over the entries of an existing archive
pub struct ZipReader<R: Read + Seek> {
    inner: zip::ZipArchive<R>,
}

impl ZipReader<Cursor<Vec<u8>>> {
    /// Open an archive held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self { inner: zip::ZipArchive::new(Cursor::new(bytes))? })
    }
}

impl ZipReader<File> {
    /// Open an archive file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Ok(Self { inner: zip::ZipArchive::new(file)? })
    }
}

impl<R: Read + Seek> ZipReader<R> {
    pub fn entry_count(&self) -> usize {
        self.inner.len()
    }

    pub fn entry_name(&mut self, index: usize) -> Result<String> {
        Ok(self.inner.by_index(index)?.name().to_string())
    }

    pub fn entry_bytes(&mut self, index: usize) -> Result<Vec<u8>> {
        let mut entry = self.inner.by_index(index)?;
        let name = entry.name().to_string();
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| Error::io(PathBuf::from(name), e))?;
        Ok(bytes)
    }
}

/// Writer building a new archive entry by entry
pub struct ZipWriter<W: Write + Seek> {
    inner: zip::ZipWriter<W>,
}

impl ZipWriter<Cursor<Vec<u8>>> {
    /// Build an archive in memory
    pub fn in_memory() -> Self {
        Self { inner: zip::ZipWriter::new(Cursor::new(Vec::new())) }
    }

    /// Finalize and return the archive bytes
    pub fn finish_into_bytes(self) -> Result<Vec<u8>> {
        Ok(self.inner.finish()?.into_inner())
    }
}

impl ZipWriter<File> {
    /// Build an archive directly into a file
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        Ok(Self { inner: zip::ZipWriter::new(file) })
    }

    /// Finalize the archive file
    pub fn finish(self) -> Result<()> {
        self.inner.finish()?;
        Ok(())
    }
}

impl<W: Write + Seek> ZipWriter<W> {
    /// Append one file entry with the given unix permission mode
    pub fn write_entry(&mut self, name: &str, bytes: &[u8], mode: u32) -> Result<()> {
        let options = SimpleFileOptions::default().unix_permissions(mode);
        self.inner.start_file(name, options)?;
        self.inner
            .write_all(bytes)
            .map_err(|e| Error::io(PathBuf::from(name), e))?;
        Ok(())
    }
}
