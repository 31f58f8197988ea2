//! Error types for the passvault-auth crate.

use std::path::PathBuf;

use passvault_crypto::CryptoError;

/// Alias for `Result<T, AuthError>`.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors raised by a [`UserDirectory`](crate::UserDirectory).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// An account with this email already exists.
    #[error("user already registered: {email}")]
    DuplicateUser { email: String },

    /// No account has this id.
    #[error("user not found: {user_id}")]
    UserNotFound { user_id: u64 },

    /// Unknown email or wrong password. The two are not distinguished.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The users file could not be read or replaced.
    #[error("user directory I/O failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The users file is not valid JSON for this schema.
    #[error("malformed user directory: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
