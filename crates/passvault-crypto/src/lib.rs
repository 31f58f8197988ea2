//! Crypto layer for the PassVault storage engine.
//!
//! Secrets are encrypted field-by-field before they reach disk. Each user owns
//! one [`EncryptionKey`] derived at registration; every sealed field carries
//! its own freshly generated iv.
//!
//! # Modules
//!
//! - [`primitives`]: random bytes, salts, PBKDF2-HMAC-SHA256 key derivation
//!   and password hashing (via `ring`).
//! - [`codec`]: AES-256-CBC field encryption with hex encoding.
//! - [`error`]: unified error type.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use passvault_crypto::{EncryptionKey, codec, primitives};
//!
//! # fn example() -> passvault_crypto::CryptoResult<()> {
//! let salt = primitives::generate_salt()?;
//! let key = EncryptionKey::derive("correct horse", &salt, primitives::DEFAULT_ITERATIONS)?;
//!
//! let sealed = codec::seal("hunter2", &key)?;
//! let plain = codec::decrypt_field(&sealed.ciphertext, &key, &sealed.iv)?;
//! assert_eq!(plain, "hunter2");
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod primitives;

pub use codec::{EncryptionKey, IV_LEN, Iv, Sealed, decrypt_field, encrypt_field, seal};
pub use error::{CryptoError, CryptoResult};
pub use primitives::{DEFAULT_ITERATIONS, KEY_LEN, SALT_LEN};
