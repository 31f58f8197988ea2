//! The contract the storage coordinator consumes.

use passvault_crypto::EncryptionKey;

use crate::error::AuthResult;

/// Source of user identities, sessions, and per-user encryption keys.
///
/// The vault never sees passwords after registration; it asks the directory
/// for a user's key each time it seals or opens a record.
pub trait UserDirectory {
    /// Create an account and return its new user id.
    ///
    /// Fails with [`AuthError::DuplicateUser`](crate::AuthError::DuplicateUser)
    /// if the email is taken.
    fn register(&mut self, email: &str, password: &str, recovery_phrase: &str) -> AuthResult<u64>;

    /// Check credentials and open a session, returning its token.
    fn login(&mut self, email: &str, password: &str) -> AuthResult<String>;

    /// End a session. Returns `false` if the token was unknown.
    fn logout(&mut self, token: &str) -> bool;

    /// The user behind a live session token.
    fn validate_session(&mut self, token: &str) -> Option<u64>;

    /// The key that seals every vault entry of `user_id`.
    fn encryption_key(&self, user_id: u64) -> AuthResult<EncryptionKey>;
}
