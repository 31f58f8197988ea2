//! The single entry point binding users, encryption, and storage.
//!
//! The index is maintained on every insert but reads do not depend on it:
//! list, search, get, update, and delete all scan the record file and filter
//! by owner. Index keys left behind by deletes or site renames are harmless
//! hints; [`StorageCoordinator::compact_index`] drops them.

use std::path::PathBuf;

use chrono::Utc;
use passvault_auth::{FileUserDirectory, UserDirectory};
use passvault_crypto::{EncryptionKey, decrypt_field, seal};
use passvault_store::{BTreeIndex, RecordStore, StoreError, StoreOptions, VaultRecord, check_key};
use tracing::{debug, info, instrument, warn};

use crate::config::VaultConfig;
use crate::entry::{EntryFields, IndexStats, VaultEntry};
use crate::error::{VaultError, VaultResult};

/// How list and search treat a record whose password will not decrypt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptPolicy {
    /// Return the entry with `password: None` and log a warning.
    Mask,
    /// Fail the whole call with [`VaultError::DecryptionFailure`].
    Strict,
}

impl DecryptPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict { Self::Strict } else { Self::Mask }
    }
}

/// Owner-scoped vault operations over one index and record file pair.
///
/// Not internally synchronized; wrap it in [`SharedVault`](crate::SharedVault)
/// to serve concurrent callers.
#[derive(Debug)]
pub struct StorageCoordinator<D> {
    index: BTreeIndex,
    records: RecordStore,
    directory: D,
    options: StoreOptions,
    policy: DecryptPolicy,
}

/// Open the vault described by `config` with its file-backed user directory.
pub fn open_vault(config: &VaultConfig) -> VaultResult<StorageCoordinator<FileUserDirectory>> {
    config.validate()?;
    create_data_dir(config)?;
    let directory = FileUserDirectory::open_with(config.users_path(), config.directory_options())?;
    StorageCoordinator::open(config, directory)
}

fn create_data_dir(config: &VaultConfig) -> VaultResult<()> {
    std::fs::create_dir_all(&config.data_dir).map_err(|source| {
        VaultError::Store(StoreError::StorageFailure {
            path: config.data_dir.clone(),
            source,
        })
    })
}

fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

impl<D: UserDirectory> StorageCoordinator<D> {
    /// Open the index and record file named by `config`, using `directory`
    /// for users and keys.
    pub fn open(config: &VaultConfig, directory: D) -> VaultResult<Self> {
        create_data_dir(config)?;
        Self::open_at(
            config.index_path(),
            config.store_options(),
            DecryptPolicy::from_strict(config.strict_decrypt),
            directory,
        )
    }

    /// Open with explicit paths and options.
    ///
    /// The index's record counter is raised past the highest id found in the
    /// record file, so ids are never reissued even if the index was replaced.
    pub fn open_at(
        index_path: impl Into<PathBuf>,
        options: StoreOptions,
        policy: DecryptPolicy,
        directory: D,
    ) -> VaultResult<Self> {
        let index_path = index_path.into();
        let mut index = BTreeIndex::open_with(&index_path, options)?;
        let records = RecordStore::for_index(&index_path, options);

        let max_id = records.max_record_id()?;
        index.ensure_record_id_floor(max_id)?;

        info!(
            index = %index_path.display(),
            max_record_id = max_id,
            ?policy,
            "vault opened"
        );
        Ok(Self {
            index,
            records,
            directory,
            options,
            policy,
        })
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut D {
        &mut self.directory
    }

    pub fn decrypt_policy(&self) -> DecryptPolicy {
        self.policy
    }

    // ── directory passthroughs ───────────────────────────────────────

    #[instrument(skip(self, password, recovery_phrase))]
    pub fn register(
        &mut self,
        email: &str,
        password: &str,
        recovery_phrase: &str,
    ) -> VaultResult<u64> {
        Ok(self.directory.register(email, password, recovery_phrase)?)
    }

    #[instrument(skip(self, password))]
    pub fn login(&mut self, email: &str, password: &str) -> VaultResult<String> {
        Ok(self.directory.login(email, password)?)
    }

    pub fn logout(&mut self, token: &str) -> bool {
        self.directory.logout(token)
    }

    pub fn validate_session(&mut self, token: &str) -> Option<u64> {
        self.directory.validate_session(token)
    }

    // ── vault operations ─────────────────────────────────────────────

    /// Encrypt and store a new entry for `user_id`, returning its record id.
    #[instrument(skip(self, entry), fields(site = %entry.site_name))]
    pub fn add_entry(&mut self, user_id: u64, entry: &EntryFields) -> VaultResult<u64> {
        let key = self.directory.encryption_key(user_id)?;
        check_site(&entry.site_name)?;

        let sealed = seal(&entry.password, &key)?;
        let now = now_secs();
        let record = VaultRecord {
            record_id: 0,
            user_id,
            site_name: entry.site_name.clone(),
            username: entry.username.clone(),
            encrypted_password: sealed.ciphertext,
            iv: sealed.iv,
            notes: entry.notes.clone(),
            category: entry.category.clone(),
            created_at: now,
            modified_at: now,
        };

        let record_id = self.records.append(&mut self.index, record)?;
        self.index.insert_key(&entry.site_name, record_id)?;

        debug!(user_id, record_id, "entry added");
        Ok(record_id)
    }

    /// Every entry owned by `user_id`, in insertion order.
    #[instrument(skip(self))]
    pub fn list_entries(&self, user_id: u64) -> VaultResult<Vec<VaultEntry>> {
        self.collect_owned(user_id, |_| true)
    }

    /// Entries owned by `user_id` whose site name equals `site`.
    #[instrument(skip(self))]
    pub fn search_by_site(&self, user_id: u64, site: &str) -> VaultResult<Vec<VaultEntry>> {
        self.collect_owned(user_id, |r| r.site_name == site)
    }

    /// One entry by id.
    ///
    /// Returns `Ok(None)` if no such record exists and
    /// [`VaultError::Unauthorized`] if another user owns it. Decryption
    /// failures are always reported here, whatever the policy.
    #[instrument(skip(self))]
    pub fn get_entry(&self, user_id: u64, record_id: u64) -> VaultResult<Option<VaultEntry>> {
        let Some(record) = self.records.find(record_id)? else {
            return Ok(None);
        };
        ensure_owner(&record, user_id)?;

        let key = self.directory.encryption_key(user_id)?;
        let password = open_password(&record, &key)?;
        Ok(Some(VaultEntry::from_record(record, Some(password))))
    }

    /// Replace the fields of an entry owned by `user_id`.
    ///
    /// The password is sealed again under a fresh iv and `modified_at` is
    /// refreshed; `record_id`, `user_id`, and `created_at` are kept. Returns
    /// `Ok(false)` if the record does not exist.
    #[instrument(skip(self, entry), fields(site = %entry.site_name))]
    pub fn update_entry(
        &mut self,
        user_id: u64,
        record_id: u64,
        entry: &EntryFields,
    ) -> VaultResult<bool> {
        let mut all = self.records.load_all()?;
        let Some(pos) = all.iter().position(|r| r.record_id == record_id) else {
            return Ok(false);
        };
        ensure_owner(&all[pos], user_id)?;
        check_site(&entry.site_name)?;

        let key = self.directory.encryption_key(user_id)?;
        let sealed = seal(&entry.password, &key)?;

        let target = &mut all[pos];
        let site_changed = target.site_name != entry.site_name;
        target.site_name = entry.site_name.clone();
        target.username = entry.username.clone();
        target.encrypted_password = sealed.ciphertext;
        target.iv = sealed.iv;
        target.notes = entry.notes.clone();
        target.category = entry.category.clone();
        target.modified_at = now_secs().max(target.created_at);

        self.records.replace_all(&all)?;
        if site_changed {
            self.index.insert_key(&entry.site_name, record_id)?;
        }

        debug!(user_id, record_id, site_changed, "entry updated");
        Ok(true)
    }

    /// Remove an entry owned by `user_id`. Returns `Ok(false)` if the record
    /// does not exist. The index key is left in place.
    #[instrument(skip(self))]
    pub fn delete_entry(&mut self, user_id: u64, record_id: u64) -> VaultResult<bool> {
        let mut all = self.records.load_all()?;
        let Some(pos) = all.iter().position(|r| r.record_id == record_id) else {
            return Ok(false);
        };
        ensure_owner(&all[pos], user_id)?;

        all.remove(pos);
        self.records.replace_all(&all)?;

        debug!(user_id, record_id, "entry deleted");
        Ok(true)
    }

    // ── index maintenance ────────────────────────────────────────────

    /// Rebuild the index from the live records, dropping stale keys.
    #[instrument(skip(self))]
    pub fn compact_index(&mut self) -> VaultResult<IndexStats> {
        let before = self.index.len()?;
        let live = self.records.load_all()?;
        let next_record_id = self.index.metadata().next_record_id;
        let path = self.index.path().to_path_buf();

        self.index = BTreeIndex::rebuild(
            &path,
            live.into_iter().map(|r| (r.site_name, r.record_id)),
            next_record_id,
            self.options,
        )?;

        let stats = self.index_stats()?;
        info!(
            before,
            after = stats.index_entries,
            "index compacted"
        );
        Ok(stats)
    }

    /// Compare the index against the record file.
    pub fn index_stats(&self) -> VaultResult<IndexStats> {
        let mut live: Vec<(String, u64)> = self
            .records
            .load_all()?
            .into_iter()
            .map(|r| (r.site_name, r.record_id))
            .collect();
        live.sort_unstable();

        let mut indexed = self.index.entries()?;
        indexed.sort_unstable();
        indexed.dedup();

        let live_keys = indexed
            .iter()
            .filter(|e| live.binary_search(e).is_ok())
            .count();
        let unindexed_records = live
            .iter()
            .filter(|e| indexed.binary_search(e).is_err())
            .count();

        let meta = self.index.metadata();
        Ok(IndexStats {
            index_entries: self.index.len()?,
            records: live.len(),
            live_keys,
            stale_keys: indexed.len() - live_keys,
            unindexed_records,
            height: self.index.height()?,
            node_count: meta.next_node_id,
            next_record_id: meta.next_record_id,
        })
    }

    // ── helpers ──────────────────────────────────────────────────────

    fn collect_owned<F>(&self, user_id: u64, keep: F) -> VaultResult<Vec<VaultEntry>>
    where
        F: Fn(&VaultRecord) -> bool,
    {
        let key = self.directory.encryption_key(user_id)?;
        let mut out = Vec::new();
        for record in self.records.scan()? {
            let record = record?;
            if record.user_id != user_id || !keep(&record) {
                continue;
            }
            let password = match open_password(&record, &key) {
                Ok(p) => Some(p),
                Err(e) if self.policy == DecryptPolicy::Mask => {
                    warn!(record_id = record.record_id, error = %e, "masking undecryptable entry");
                    None
                }
                Err(e) => return Err(e),
            };
            out.push(VaultEntry::from_record(record, password));
        }
        Ok(out)
    }
}

fn ensure_owner(record: &VaultRecord, user_id: u64) -> VaultResult<()> {
    if record.user_id != user_id {
        warn!(
            user_id,
            record_id = record.record_id,
            "rejected access to foreign record"
        );
        return Err(VaultError::Unauthorized {
            user_id,
            record_id: record.record_id,
        });
    }
    Ok(())
}

fn check_site(site: &str) -> VaultResult<()> {
    if site.is_empty() {
        return Err(VaultError::InvalidArgument(
            "site name must not be empty".into(),
        ));
    }
    check_key(site)?;
    Ok(())
}

fn open_password(record: &VaultRecord, key: &EncryptionKey) -> VaultResult<String> {
    decrypt_field(&record.encrypted_password, key, &record.iv).map_err(|e| {
        VaultError::DecryptionFailure {
            record_id: record.record_id,
            reason: e.to_string(),
        }
    })
}
