//! Error types for the passvault-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! Uses `thiserror` for ergonomic, zero-cost error definitions.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file could not be opened, read, written, synced or renamed.
    #[error("storage failure at {}: {source}", path.display())]
    StorageFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record file holds a truncated or malformed record.
    #[error("corrupt record store at byte {offset}: {reason}")]
    CorruptStore { offset: u64, reason: String },

    /// A B-tree page violates a structural invariant.
    #[error("corrupt index page {node_id}: {reason}")]
    CorruptPage { node_id: u64, reason: String },

    /// The index header is truncated or inconsistent.
    #[error("corrupt index header: {reason}")]
    CorruptHeader { reason: String },

    /// A key does not fit the per-key budget of a page.
    #[error("key of {len} bytes exceeds the {max}-byte index key limit")]
    OversizedKey { len: usize, max: usize },

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    /// Build a closure that wraps an I/O error with the path it concerns.
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::StorageFailure {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn page(node_id: u64, reason: impl Into<String>) -> Self {
        Self::CorruptPage {
            node_id,
            reason: reason.into(),
        }
    }
}
