//! User directory for PassVault.
//!
//! Owns accounts, password verification, login sessions, and the per-user
//! encryption key the vault seals entries with. The storage coordinator
//! depends only on the [`UserDirectory`] trait; [`FileUserDirectory`] is the
//! JSON-file implementation used by the binary.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use passvault_auth::{FileUserDirectory, UserDirectory};
//!
//! # fn example() -> passvault_auth::AuthResult<()> {
//! let mut users = FileUserDirectory::open("data/users.json")?;
//! let user_id = users.register("alice@example.com", "s3cret", "recovery words")?;
//! let token = users.login("alice@example.com", "s3cret")?;
//! assert_eq!(users.validate_session(&token), Some(user_id));
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod error;
pub mod file_directory;
pub mod session;

pub use directory::UserDirectory;
pub use error::{AuthError, AuthResult};
pub use file_directory::{DirectoryOptions, FileUserDirectory, StoredUser, normalize_email};
pub use session::{Session, SessionTable};
