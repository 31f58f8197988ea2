//! JSON-file-backed [`UserDirectory`].
//!
//! Accounts live in a single JSON document that is rewritten through a temp
//! file and renamed into place on every registration. Passwords and recovery
//! phrases are stored only as salted PBKDF2 hashes. Each account also holds
//! the encryption key derived at registration under its own salt, which is
//! what the vault seals entries with.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use passvault_crypto::primitives::{generate_salt, hash_password, verify_password};
use passvault_crypto::{DEFAULT_ITERATIONS, EncryptionKey};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::directory::UserDirectory;
use crate::error::{AuthError, AuthResult};
use crate::session::SessionTable;

// ═══════════════════════════════════════════════════════════════════════
//  Options
// ═══════════════════════════════════════════════════════════════════════

/// Tunables for a [`FileUserDirectory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryOptions {
    /// PBKDF2 iterations for new accounts. Existing accounts keep the count
    /// they were registered with.
    ///
    /// Default: **100 000**.
    pub kdf_iterations: u32,

    /// Lifetime of a login session.
    ///
    /// Default: **24 hours**.
    pub session_ttl: Duration,

    /// Sync the users file before renaming it into place.
    ///
    /// Default: **true**.
    pub sync_writes: bool,
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_ITERATIONS,
            session_ttl: Duration::hours(24),
            sync_writes: true,
        }
    }
}

impl DirectoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Persisted types
// ═══════════════════════════════════════════════════════════════════════

/// One account as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredUser {
    pub user_id: u64,
    /// Trimmed and lowercased.
    pub email: String,
    pub password_salt: String,
    pub password_hash: String,
    pub recovery_salt: String,
    pub recovery_hash: String,
    pub key_salt: String,
    /// Hex AES-256 key sealing this user's vault entries.
    pub encryption_key: String,
    pub kdf_iterations: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct UsersFile {
    next_user_id: u64,
    users: Vec<StoredUser>,
}

impl Default for UsersFile {
    fn default() -> Self {
        Self {
            next_user_id: 1,
            users: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  FileUserDirectory
// ═══════════════════════════════════════════════════════════════════════

/// User directory persisted as a JSON file, with in-memory sessions.
#[derive(Debug)]
pub struct FileUserDirectory {
    path: PathBuf,
    options: DirectoryOptions,
    next_user_id: u64,
    users: Vec<StoredUser>,
    sessions: SessionTable,
}

/// Canonical form of an email for storage and matching.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl FileUserDirectory {
    /// Open the directory at `path`; a missing file is an empty directory.
    pub fn open(path: impl AsRef<Path>) -> AuthResult<Self> {
        Self::open_with(path, DirectoryOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: DirectoryOptions) -> AuthResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => UsersFile::default(),
            Ok(text) => serde_json::from_str::<UsersFile>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => UsersFile::default(),
            Err(e) => return Err(AuthError::io(&path)(e)),
        };

        let max_id = file.users.iter().map(|u| u.user_id).max().unwrap_or(0);
        if file.next_user_id <= max_id {
            warn!(
                next_user_id = file.next_user_id,
                max_id, "users file counter behind highest id; advancing"
            );
            file.next_user_id = max_id + 1;
        }

        info!(path = %path.display(), users = file.users.len(), "opened user directory");
        Ok(Self {
            path,
            options,
            next_user_id: file.next_user_id,
            users: file.users,
            sessions: SessionTable::new(options.session_ttl),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn find_by_email(&self, email: &str) -> Option<&StoredUser> {
        let email = normalize_email(email);
        self.users.iter().find(|u| u.email == email)
    }

    pub fn find_by_id(&self, user_id: u64) -> Option<&StoredUser> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    /// Check a recovery phrase against the stored hash for `email`.
    pub fn verify_recovery_phrase(&self, email: &str, phrase: &str) -> bool {
        self.find_by_email(email).is_some_and(|u| {
            verify_password(phrase, &u.recovery_salt, &u.recovery_hash, u.kdf_iterations)
        })
    }

    /// Number of live sessions after pruning expired ones.
    pub fn active_sessions(&mut self) -> usize {
        self.sessions.prune(Utc::now());
        self.sessions.len()
    }

    fn save(&self) -> AuthResult<()> {
        let doc = UsersFile {
            next_user_id: self.next_user_id,
            users: self.users.clone(),
        };
        let json = serde_json::to_vec_pretty(&doc)?;

        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(AuthError::io(dir))?;
        tmp.write_all(&json).map_err(AuthError::io(tmp.path()))?;
        if self.options.sync_writes {
            tmp.as_file().sync_all().map_err(AuthError::io(tmp.path()))?;
        }
        tmp.persist(&self.path)
            .map_err(|e| AuthError::io(&self.path)(e.error))?;
        debug!(path = %self.path.display(), users = self.users.len(), "saved user directory");
        Ok(())
    }
}

impl UserDirectory for FileUserDirectory {
    #[instrument(skip(self, password, recovery_phrase))]
    fn register(&mut self, email: &str, password: &str, recovery_phrase: &str) -> AuthResult<u64> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthError::InvalidArgument("email must not be empty".into()));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidArgument(
                "password must not be empty".into(),
            ));
        }
        if self.find_by_email(&email).is_some() {
            return Err(AuthError::DuplicateUser { email });
        }

        let iterations = self.options.kdf_iterations;
        let password_salt = generate_salt()?;
        let recovery_salt = generate_salt()?;
        let key_salt = generate_salt()?;
        let key = EncryptionKey::derive(password, &key_salt, iterations)?;

        let user = StoredUser {
            user_id: self.next_user_id,
            email: email.clone(),
            password_hash: hash_password(password, &password_salt, iterations)?,
            password_salt,
            recovery_hash: hash_password(recovery_phrase, &recovery_salt, iterations)?,
            recovery_salt,
            key_salt,
            encryption_key: key.as_hex().to_owned(),
            kdf_iterations: iterations,
            created_at: Utc::now(),
        };
        let user_id = user.user_id;

        self.users.push(user);
        self.next_user_id += 1;
        if let Err(e) = self.save() {
            self.users.pop();
            self.next_user_id -= 1;
            return Err(e);
        }

        info!(user_id, "registered user");
        Ok(user_id)
    }

    #[instrument(skip(self, password))]
    fn login(&mut self, email: &str, password: &str) -> AuthResult<String> {
        let user_id = match self.find_by_email(email) {
            Some(u)
                if verify_password(password, &u.password_salt, &u.password_hash, u.kdf_iterations) =>
            {
                u.user_id
            }
            _ => {
                debug!("login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let token = self.sessions.issue(user_id, Utc::now())?;
        debug!(user_id, "session opened");
        Ok(token)
    }

    #[instrument(skip(self, token))]
    fn logout(&mut self, token: &str) -> bool {
        self.sessions.revoke(token)
    }

    #[instrument(skip(self, token))]
    fn validate_session(&mut self, token: &str) -> Option<u64> {
        self.sessions.validate(token, Utc::now())
    }

    fn encryption_key(&self, user_id: u64) -> AuthResult<EncryptionKey> {
        let user = self
            .find_by_id(user_id)
            .ok_or(AuthError::UserNotFound { user_id })?;
        Ok(EncryptionKey::from_hex(user.encryption_key.clone())?)
    }
}
