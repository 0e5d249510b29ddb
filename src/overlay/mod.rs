//! Overlay filesystem module
//!
//! The overlay buffers writes and removals in memory and merges them with
//! the real directory tree for all reads; the transactional filesystem
//! persists the overlay through the diff-log save protocol.

mod filesystem;
mod store;

pub use filesystem::{FileFilter, OpenOptions, RestoreMode, TransactionalFs};
pub use store::OverlayStore;
