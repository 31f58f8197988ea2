//! Crypto error types.
//!
//! Every primitive and codec call surfaces failures through [`CryptoError`].
//! Decryption failures are kept distinct from everything else so that read
//! paths can decide whether to mask them or abort.

/// Unified error type for the PassVault crypto layer.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ciphertext could not be decrypted (wrong key, bad padding, malformed
    /// hex, or an iv that does not belong to this ciphertext).
    #[error("decryption failed: {reason}")]
    DecryptionFailure { reason: String },

    /// A primitive failed: bad key or iv length, invalid hex input,
    /// zero iteration count, or the system randomness source.
    #[error("crypto failure: {reason}")]
    CryptoFailure { reason: String },
}

impl CryptoError {
    pub(crate) fn failure(reason: impl Into<String>) -> Self {
        Self::CryptoFailure {
            reason: reason.into(),
        }
    }

    pub(crate) fn decryption(reason: impl Into<String>) -> Self {
        Self::DecryptionFailure {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crypto crate.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
