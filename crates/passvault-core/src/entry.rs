//! Plaintext views of vault records.

use std::fmt;

use passvault_store::VaultRecord;
use serde::Serialize;

/// Placeholder callers may show when a password could not be decrypted.
pub const DECRYPTION_FAILED_PLACEHOLDER: &str = "[DECRYPTION_FAILED]";

/// A vault entry as returned to its owner.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct VaultEntry {
    pub record_id: u64,
    pub user_id: u64,
    pub site_name: String,
    pub username: String,
    /// `None` when the stored ciphertext could not be opened with the
    /// owner's key.
    pub password: Option<String>,
    pub notes: String,
    pub category: String,
    pub created_at: u64,
    pub modified_at: u64,
}

impl VaultEntry {
    pub(crate) fn from_record(record: VaultRecord, password: Option<String>) -> Self {
        Self {
            record_id: record.record_id,
            user_id: record.user_id,
            site_name: record.site_name,
            username: record.username,
            password,
            notes: record.notes,
            category: record.category,
            created_at: record.created_at,
            modified_at: record.modified_at,
        }
    }

    /// The password, or `placeholder` if it could not be decrypted.
    pub fn display_password<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.password.as_deref().unwrap_or(placeholder)
    }

    pub fn is_masked(&self) -> bool {
        self.password.is_none()
    }
}

impl fmt::Debug for VaultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultEntry")
            .field("record_id", &self.record_id)
            .field("user_id", &self.user_id)
            .field("site_name", &self.site_name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("category", &self.category)
            .field("modified_at", &self.modified_at)
            .finish_non_exhaustive()
    }
}

/// Caller-supplied fields for adding or updating an entry.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EntryFields {
    pub site_name: String,
    pub username: String,
    pub password: String,
    pub notes: String,
    pub category: String,
}

impl EntryFields {
    pub fn new(
        site_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            site_name: site_name.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

impl fmt::Debug for EntryFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryFields")
            .field("site_name", &self.site_name)
            .field("username", &self.username)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Consistency report comparing the index with the record file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Keys held by the index.
    pub index_entries: usize,
    /// Records in the record file.
    pub records: usize,
    /// Index keys that still point at a live record with that site.
    pub live_keys: usize,
    /// Index keys left behind by deletes and site renames.
    pub stale_keys: usize,
    /// Records with no matching index key.
    pub unindexed_records: usize,
    pub height: usize,
    pub node_count: u64,
    pub next_record_id: u64,
}
