//! Storage coordinator for PassVault.
//!
//! Binds the user directory, the field encryption codec, and the on-disk
//! index and record file into owner-scoped vault operations. Every password
//! is sealed with its owner's key under a fresh iv before it is written, and
//! opened only after ownership has been checked.
//!
//! # Modules
//!
//! - [`coordinator`]: [`StorageCoordinator`] and [`open_vault`].
//! - [`shared`]: [`SharedVault`], the async, mutex-guarded handle.
//! - [`entry`]: plaintext entry views and index statistics.
//! - [`config`]: [`VaultConfig`], TOML plus environment overrides.
//! - [`error`]: [`VaultError`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use passvault_core::{EntryFields, VaultConfig, open_vault};
//!
//! # fn example() -> passvault_core::VaultResult<()> {
//! let config = VaultConfig::load("passvault.toml")?;
//! let mut vault = open_vault(&config)?;
//!
//! let user_id = vault.register("alice@example.com", "s3cret", "recovery words")?;
//! let id = vault.add_entry(user_id, &EntryFields::new("github.com", "alice", "hunter2"))?;
//!
//! let entries = vault.list_entries(user_id)?;
//! assert_eq!(entries[0].password.as_deref(), Some("hunter2"));
//! assert!(vault.delete_entry(user_id, id)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod shared;

pub use config::VaultConfig;
pub use coordinator::{DecryptPolicy, StorageCoordinator, open_vault};
pub use entry::{DECRYPTION_FAILED_PLACEHOLDER, EntryFields, IndexStats, VaultEntry};
pub use error::{VaultError, VaultResult};
pub use shared::SharedVault;
