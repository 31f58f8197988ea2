//! Thread-safe async handle to a [`StorageCoordinator`].
//!
//! The coordinator is single-writer and blocks on file I/O. [`SharedVault`]
//! puts it behind an `Arc<Mutex<>>` and runs every call on tokio's blocking
//! pool, so async callers are serialized without stalling the runtime.

use std::sync::{Arc, Mutex};

use passvault_auth::UserDirectory;

use crate::coordinator::StorageCoordinator;
use crate::entry::{EntryFields, IndexStats, VaultEntry};
use crate::error::{VaultError, VaultResult};

/// Cloneable handle; all clones share one coordinator.
pub struct SharedVault<D> {
    inner: Arc<Mutex<StorageCoordinator<D>>>,
}

impl<D> Clone for SharedVault<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D> SharedVault<D>
where
    D: UserDirectory + Send + 'static,
{
    pub fn new(coordinator: StorageCoordinator<D>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(coordinator)),
        }
    }

    /// Run `f` against the coordinator on the blocking pool.
    ///
    /// This is the primitive every other method is built on.
    pub async fn execute<F, T>(&self, f: F) -> VaultResult<T>
    where
        F: FnOnce(&mut StorageCoordinator<D>) -> VaultResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut vault = inner
                .lock()
                .map_err(|e| VaultError::TaskJoin(format!("vault mutex poisoned: {e}")))?;
            f(&mut vault)
        })
        .await?
    }

    pub async fn register(
        &self,
        email: String,
        password: String,
        recovery_phrase: String,
    ) -> VaultResult<u64> {
        self.execute(move |v| v.register(&email, &password, &recovery_phrase))
            .await
    }

    pub async fn login(&self, email: String, password: String) -> VaultResult<String> {
        self.execute(move |v| v.login(&email, &password)).await
    }

    pub async fn logout(&self, token: String) -> VaultResult<bool> {
        self.execute(move |v| Ok(v.logout(&token))).await
    }

    pub async fn validate_session(&self, token: String) -> VaultResult<Option<u64>> {
        self.execute(move |v| Ok(v.validate_session(&token))).await
    }

    pub async fn add_entry(&self, user_id: u64, entry: EntryFields) -> VaultResult<u64> {
        self.execute(move |v| v.add_entry(user_id, &entry)).await
    }

    pub async fn list_entries(&self, user_id: u64) -> VaultResult<Vec<VaultEntry>> {
        self.execute(move |v| v.list_entries(user_id)).await
    }

    pub async fn search_by_site(&self, user_id: u64, site: String) -> VaultResult<Vec<VaultEntry>> {
        self.execute(move |v| v.search_by_site(user_id, &site)).await
    }

    pub async fn get_entry(&self, user_id: u64, record_id: u64) -> VaultResult<Option<VaultEntry>> {
        self.execute(move |v| v.get_entry(user_id, record_id)).await
    }

    pub async fn update_entry(
        &self,
        user_id: u64,
        record_id: u64,
        entry: EntryFields,
    ) -> VaultResult<bool> {
        self.execute(move |v| v.update_entry(user_id, record_id, &entry))
            .await
    }

    pub async fn delete_entry(&self, user_id: u64, record_id: u64) -> VaultResult<bool> {
        self.execute(move |v| v.delete_entry(user_id, record_id)).await
    }

    pub async fn compact_index(&self) -> VaultResult<IndexStats> {
        self.execute(|v| v.compact_index()).await
    }

    pub async fn index_stats(&self) -> VaultResult<IndexStats> {
        self.execute(|v| v.index_stats()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use crate::coordinator::open_vault;

    fn config(dir: &std::path::Path) -> VaultConfig {
        VaultConfig::default()
            .with_data_dir(dir)
            .with_sync_writes(false)
            .with_kdf_iterations(1_000)
    }

    #[tokio::test]
    async fn concurrent_adds_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let vault = SharedVault::new(open_vault(&config(dir.path())).unwrap());
        let user = vault
            .register("a@x.io".into(), "pw".into(), "phrase".into())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let vault = vault.clone();
            handles.push(tokio::spawn(async move {
                vault
                    .add_entry(user, EntryFields::new(format!("site{i}.com"), "u", "p"))
                    .await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=16).collect::<Vec<_>>());
        assert_eq!(vault.list_entries(user).await.unwrap().len(), 16);

        let stats = vault.index_stats().await.unwrap();
        assert_eq!(stats.live_keys, 16);
    }

    #[tokio::test]
    async fn session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vault = SharedVault::new(open_vault(&config(dir.path())).unwrap());
        let user = vault
            .register("a@x.io".into(), "pw".into(), "phrase".into())
            .await
            .unwrap();
        let token = vault.login("a@x.io".into(), "pw".into()).await.unwrap();
        assert_eq!(vault.validate_session(token.clone()).await.unwrap(), Some(user));
        assert!(vault.logout(token.clone()).await.unwrap());
        assert_eq!(vault.validate_session(token).await.unwrap(), None);
    }
}
