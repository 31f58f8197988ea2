//! Error types for the passvault-core crate.
//!
//! [`VaultError`] is the one enum callers of the coordinator match on. Store
//! and crypto failures are wrapped; the directory's user-level failures are
//! lifted into their own variants.

use passvault_auth::AuthError;
use passvault_crypto::CryptoError;
use passvault_store::StoreError;
use thiserror::Error;

/// Alias for `Result<T, VaultError>`.
pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Index or record file failure: I/O, corruption, oversized key.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A crypto primitive failed while sealing.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Directory failure other than the ones lifted below.
    #[error(transparent)]
    Auth(AuthError),

    #[error("user not found: {user_id}")]
    UserNotFound { user_id: u64 },

    #[error("user already registered: {email}")]
    DuplicateUser { email: String },

    /// The caller does not own the record it tried to touch.
    #[error("user {user_id} may not access record {record_id}")]
    Unauthorized { user_id: u64, record_id: u64 },

    /// A stored password could not be opened with its owner's key.
    #[error("record {record_id} could not be decrypted: {reason}")]
    DecryptionFailure { record_id: u64, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// A blocking task was cancelled or panicked, or the lock was poisoned.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<AuthError> for VaultError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UserNotFound { user_id } => Self::UserNotFound { user_id },
            AuthError::DuplicateUser { email } => Self::DuplicateUser { email },
            AuthError::Crypto(e) => Self::Crypto(e),
            other => Self::Auth(other),
        }
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
