//! Vault configuration.
//!
//! Read from an optional TOML file, then overridden by `PASSVAULT_*`
//! environment variables. Every field has a default, so an empty or missing
//! file yields a working setup under `./data`.
//!
//! ```toml
//! data_dir = "/var/lib/passvault"
//! sync_writes = true
//! strict_decrypt = false
//! session_ttl_hours = 24
//! kdf_iterations = 100000
//! log_level = "info"
//! ```

use std::path::{Path, PathBuf};

use chrono::Duration;
use passvault_auth::DirectoryOptions;
use passvault_crypto::DEFAULT_ITERATIONS;
use passvault_store::StoreOptions;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VaultError, VaultResult};

/// Environment variable overriding [`VaultConfig::data_dir`].
pub const ENV_DATA_DIR: &str = "PASSVAULT_DATA_DIR";
/// Environment variable overriding [`VaultConfig::strict_decrypt`].
pub const ENV_STRICT_DECRYPT: &str = "PASSVAULT_STRICT_DECRYPT";
/// Environment variable overriding [`VaultConfig::sync_writes`].
pub const ENV_SYNC_WRITES: &str = "PASSVAULT_SYNC_WRITES";
/// Environment variable overriding [`VaultConfig::log_level`].
pub const ENV_LOG: &str = "PASSVAULT_LOG";

/// Settings for opening a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding the index, record, and users files.
    ///
    /// Default: `data`.
    pub data_dir: PathBuf,

    /// Index file name inside `data_dir`. Records live next to it with a
    /// `.records` suffix.
    ///
    /// Default: `vault.dat`.
    pub index_file: String,

    /// User directory file name inside `data_dir`.
    ///
    /// Default: `users.json`.
    pub users_file: String,

    /// Sync every write to disk before returning.
    ///
    /// Default: **true**.
    pub sync_writes: bool,

    /// Fail list and search calls on an undecryptable record instead of
    /// returning it with the password withheld.
    ///
    /// Default: **false**.
    pub strict_decrypt: bool,

    /// Login session lifetime in hours.
    ///
    /// Default: **24**.
    pub session_ttl_hours: u32,

    /// PBKDF2 iterations for newly registered users.
    ///
    /// Default: **100 000**.
    pub kdf_iterations: u32,

    /// Default tracing filter when `RUST_LOG` is unset.
    ///
    /// Default: `info`.
    pub log_level: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            index_file: "vault.dat".into(),
            users_file: "users.json".into(),
            sync_writes: true,
            strict_decrypt: false,
            session_ttl_hours: 24,
            kdf_iterations: DEFAULT_ITERATIONS,
            log_level: "info".into(),
        }
    }
}

impl VaultConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` if it exists, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> VaultResult<Self> {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(VaultError::Config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        config.apply_overrides(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> VaultResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| VaultError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PASSVAULT_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> VaultResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup(ENV_STRICT_DECRYPT) {
            self.strict_decrypt = parse_flag(ENV_STRICT_DECRYPT, &v)?;
        }
        if let Some(v) = lookup(ENV_SYNC_WRITES) {
            self.sync_writes = parse_flag(ENV_SYNC_WRITES, &v)?;
        }
        if let Some(level) = lookup(ENV_LOG) {
            self.log_level = level;
        }
        Ok(())
    }

    /// Reject settings the vault cannot run with.
    pub fn validate(&self) -> VaultResult<()> {
        if self.index_file.trim().is_empty() {
            return Err(VaultError::Config("index_file must not be empty".into()));
        }
        if self.users_file.trim().is_empty() {
            return Err(VaultError::Config("users_file must not be empty".into()));
        }
        if self.index_file == self.users_file {
            return Err(VaultError::Config(
                "index_file and users_file must differ".into(),
            ));
        }
        if self.kdf_iterations == 0 {
            return Err(VaultError::Config("kdf_iterations must be positive".into()));
        }
        if self.session_ttl_hours == 0 {
            return Err(VaultError::Config(
                "session_ttl_hours must be positive".into(),
            ));
        }
        Ok(())
    }

    // -- builders -----------------------------------------------------------

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn with_strict_decrypt(mut self, strict: bool) -> Self {
        self.strict_decrypt = strict;
        self
    }

    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    pub fn with_session_ttl_hours(mut self, hours: u32) -> Self {
        self.session_ttl_hours = hours;
        self
    }

    // -- derived settings ---------------------------------------------------

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.index_file)
    }

    pub fn records_path(&self) -> PathBuf {
        passvault_store::records_path(self.index_path())
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(&self.users_file)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::new().with_sync_writes(self.sync_writes)
    }

    pub fn directory_options(&self) -> DirectoryOptions {
        DirectoryOptions::new()
            .with_kdf_iterations(self.kdf_iterations)
            .with_session_ttl(Duration::hours(i64::from(self.session_ttl_hours)))
            .with_sync_writes(self.sync_writes)
    }
}

fn parse_flag(name: &str, value: &str) -> VaultResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(VaultError::Config(format!(
            "{name} must be a boolean, got {other:?}"
        ))),
    }
}
