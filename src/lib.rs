//! txfs - Transactional overlay filesystem
//!
//! An in-memory overlay atop a real directory tree: writes and removals are
//! buffered and merged into a consistent view, then committed through a
//! crash-safe, diff-log-based save protocol with automatic recovery. An
//! interrupted save is replayed from its backup diff on the next open;
//! periodic autosaves checkpoint unsaved work independently.

pub mod archive;
pub mod diff;
pub mod error;
pub mod fsutil;
pub mod lock;
pub mod overlay;
pub mod path;

pub use error::{Error, Result};
pub use overlay::{OpenOptions, RestoreMode, TransactionalFs};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::overlay::{OpenOptions, RestoreMode, TransactionalFs};
}
