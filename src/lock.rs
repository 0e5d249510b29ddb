//! Advisory directory lock
//!
//! Protects a root directory against concurrent writable opens from other
//! processes. The lock is a `.lock` file whose JSON body identifies the
//! holder; it is advisory only and never enforced by the OS.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fsutil;

/// File name of the lock marker inside the locked directory
pub const LOCK_FILE_NAME: &str = ".lock";

/// Identity of a lock holder as recorded in the lock file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub user: String,
    pub hostname: String,
    pub pid: u32,
    pub acquired: DateTime<Local>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            user: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown".to_string()),
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired: Local::now(),
        }
    }

    /// Short human-readable holder description for error messages
    pub fn holder(&self) -> String {
        format!("{}@{} (pid {})", self.user, self.hostname, self.pid)
    }
}

/// Observed state of the lock file
#[derive(Debug, Clone, PartialEq)]
pub enum LockStatus {
    /// No lock file present
    Unlocked,
    /// Lock file exists but its holder is provably gone (or the file is
    /// unreadable); safe to override
    Stale(Option<LockInfo>),
    /// Lock file exists and its holder may still be alive
    Locked(LockInfo),
}

/// Callback consulted when the lock is held by a live foreign process.
/// Returning true overrides the lock.
pub type LockHandler<'a> = &'a dyn Fn(&LockInfo) -> bool;

/// Advisory lock on one directory
#[derive(Debug)]
pub struct DirectoryLock {
    file: PathBuf,
    held: bool,
}

impl DirectoryLock {
    /// Create an unheld lock for the given directory
    pub fn new(dir: &Path) -> Self {
        Self { file: dir.join(LOCK_FILE_NAME), held: false }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Inspect the lock file without modifying it
    pub fn status(&self) -> LockStatus {
        if !self.file.is_file() {
            return LockStatus::Unlocked;
        }
        let info: LockInfo = match fsutil::read_file(&self.file)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        {
            Some(info) => info,
            None => return LockStatus::Stale(None),
        };
        let ours = LockInfo::current();
        if info.hostname == ours.hostname && !pid_alive(info.pid) {
            LockStatus::Stale(Some(info))
        } else {
            LockStatus::Locked(info)
        }
    }

    /// Try to acquire the lock.
    ///
    /// Stale locks are overridden silently. For a live foreign lock the
    /// optional handler decides whether to take it over; without a handler
    /// (or when it declines) the call fails with Error::Locked.
    pub fn try_lock(&mut self, handler: Option<LockHandler<'_>>) -> Result<()> {
        match self.status() {
            LockStatus::Unlocked => {}
            LockStatus::Stale(info) => {
                debug!(
                    file = %self.file.display(),
                    holder = %info.as_ref().map(|i| i.holder()).unwrap_or_default(),
                    "overriding stale directory lock"
                );
            }
            LockStatus::Locked(info) => {
                let take_over = handler.map(|h| h(&info)).unwrap_or(false);
                if !take_over {
                    return Err(Error::Locked {
                        path: self.file.parent().unwrap_or(&self.file).to_path_buf(),
                        holder: info.holder(),
                    });
                }
                debug!(file = %self.file.display(), holder = %info.holder(), "taking over directory lock");
            }
        }

        let info = LockInfo::current();
        let body = serde_json::to_vec_pretty(&info).map_err(|e| {
            Error::io(&self.file, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        fsutil::write_file(&self.file, &body)?;
        self.held = true;
        Ok(())
    }

    /// Release the lock if this instance holds it
    pub fn unlock_if_held(&mut self) -> Result<()> {
        if self.held {
            if self.file.is_file() {
                fsutil::remove_file(&self.file)?;
            }
            self.held = false;
        }
        Ok(())
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if let Err(e) = self.unlock_if_held() {
            warn!(file = %self.file.display(), error = %e, "failed to release directory lock");
        }
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// No portable liveness probe; treat every recorded holder as alive
#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}
