//! Integration tests for the passvault-core crate.
//!
//! These run the coordinator end to end over real files: registration,
//! sealed round trips, ownership and tenant isolation, persistence across
//! reopen, and the async shared handle.

use std::path::Path;

use passvault_core::{
    EntryFields, SharedVault, StorageCoordinator, VaultConfig, VaultError, open_vault,
};
use passvault_auth::FileUserDirectory;
use passvault_store::{RecordStore, StoreOptions};

fn config(dir: &Path) -> VaultConfig {
    VaultConfig::default()
        .with_data_dir(dir)
        .with_sync_writes(false)
        .with_kdf_iterations(1_000)
}

fn vault_with_users(dir: &Path) -> (StorageCoordinator<FileUserDirectory>, u64, u64) {
    let mut vault = open_vault(&config(dir)).unwrap();
    let alice = vault.register("alice@example.com", "pw-a", "words a").unwrap();
    let bob = vault.register("bob@example.com", "pw-b", "words b").unwrap();
    (vault, alice, bob)
}

fn record_bytes(dir: &Path) -> Vec<u8> {
    std::fs::read(config(dir).records_path()).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
//  Core lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn add_list_delete_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let mut vault = open_vault(&config(dir.path())).unwrap();
    let user = vault.register("alice@example.com", "pw", "words").unwrap();
    assert_eq!(user, 1);

    let id = vault
        .add_entry(1, &EntryFields::new("github.com", "alice", "hunter2"))
        .unwrap();
    assert_eq!(id, 1);

    let listed = vault.list_entries(1).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].site_name, "github.com");
    assert_eq!(listed[0].username, "alice");
    assert_eq!(listed[0].password.as_deref(), Some("hunter2"));
    assert_eq!(listed[0].notes, "");
    assert_eq!(listed[0].category, "");

    assert!(vault.delete_entry(1, 1).unwrap());
    assert!(vault.list_entries(1).unwrap().is_empty());
}

#[test]
fn round_trip_preserves_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let (mut vault, alice, _) = vault_with_users(dir.path());

    let cases = [
        EntryFields::new("a.com", "u1", ""),
        EntryFields::new("b.com", "", "p@ss w0rd!").with_notes("line1\nline2"),
        EntryFields::new("c.com", "ünïcødé", "пароль🔑").with_category("personal"),
        EntryFields::new("d.com", "u4", "x".repeat(1000)).with_notes("n".repeat(5000)),
    ];
    for case in &cases {
        vault.add_entry(alice, case).unwrap();
    }

    let listed = vault.list_entries(alice).unwrap();
    assert_eq!(listed.len(), cases.len());
    for (entry, case) in listed.iter().zip(&cases) {
        assert_eq!(entry.site_name, case.site_name);
        assert_eq!(entry.username, case.username);
        assert_eq!(entry.password.as_deref(), Some(case.password.as_str()));
        assert_eq!(entry.notes, case.notes);
        assert_eq!(entry.category, case.category);
        assert_eq!(entry.user_id, alice);
    }
}

#[test]
fn identical_passwords_seal_differently() {
    let dir = tempfile::tempdir().unwrap();
    let (mut vault, alice, _) = vault_with_users(dir.path());
    for _ in 0..5 {
        vault
            .add_entry(alice, &EntryFields::new("same.com", "u", "same-password"))
            .unwrap();
    }

    let records = RecordStore::new(config(dir.path()).records_path(), StoreOptions::new());
    let all = records.load_all().unwrap();
    let mut ciphertexts: Vec<_> = all.iter().map(|r| r.encrypted_password.clone()).collect();
    let mut ivs: Vec<_> = all.iter().map(|r| r.iv.clone()).collect();
    ciphertexts.sort();
    ciphertexts.dedup();
    ivs.sort();
    ivs.dedup();
    assert_eq!(ciphertexts.len(), 5);
    assert_eq!(ivs.len(), 5);
    assert!(all.iter().all(|r| !r.encrypted_password.contains("same-password")));
}

#[test]
fn search_matches_site_exactly_within_owner() {
    let dir = tempfile::tempdir().unwrap();
    let (mut vault, alice, bob) = vault_with_users(dir.path());
    vault.add_entry(alice, &EntryFields::new("github.com", "a1", "p")).unwrap();
    vault.add_entry(alice, &EntryFields::new("github.com", "a2", "p")).unwrap();
    vault.add_entry(alice, &EntryFields::new("gitlab.com", "a3", "p")).unwrap();
    vault.add_entry(bob, &EntryFields::new("github.com", "b1", "p")).unwrap();

    let hits = vault.search_by_site(alice, "github.com").unwrap();
    let names: Vec<_> = hits.iter().map(|e| e.username.as_str()).collect();
    assert_eq!(names, ["a1", "a2"]);
    assert!(vault.search_by_site(alice, "github").unwrap().is_empty());
    assert_eq!(vault.search_by_site(bob, "github.com").unwrap().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Ownership and isolation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn foreign_update_and_delete_leave_record_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (mut vault, alice, bob) = vault_with_users(dir.path());
    let id = vault
        .add_entry(alice, &EntryFields::new("bank.com", "alice", "secret"))
        .unwrap();
    let before = record_bytes(dir.path());

    let err = vault
        .update_entry(bob, id, &EntryFields::new("bank.com", "mallory", "pwned"))
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Unauthorized { user_id, record_id } if user_id == bob && record_id == id
    ));
    assert!(matches!(
        vault.delete_entry(bob, id),
        Err(VaultError::Unauthorized { .. })
    ));
    assert!(matches!(
        vault.get_entry(bob, id),
        Err(VaultError::Unauthorized { .. })
    ));

    assert_eq!(record_bytes(dir.path()), before);
    let entry = vault.get_entry(alice, id).unwrap().unwrap();
    assert_eq!(entry.password.as_deref(), Some("secret"));
}

#[test]
fn tenants_see_only_their_own_entries() {
    let dir = tempfile::tempdir().unwrap();
    let (mut vault, alice, bob) = vault_with_users(dir.path());
    for i in 0..7 {
        vault
            .add_entry(alice, &EntryFields::new(format!("a{i}.com"), "alice", format!("pa{i}")))
            .unwrap();
    }
    for i in 0..4 {
        vault
            .add_entry(bob, &EntryFields::new(format!("b{i}.com"), "bob", format!("pb{i}")))
            .unwrap();
    }

    let a = vault.list_entries(alice).unwrap();
    let b = vault.list_entries(bob).unwrap();
    assert_eq!(a.len(), 7);
    assert_eq!(b.len(), 4);
    assert!(a.iter().all(|e| e.user_id == alice && e.username == "alice"));
    assert!(b.iter().all(|e| e.user_id == bob && e.site_name.starts_with('b')));
}

#[test]
fn unknown_user_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (mut vault, _, _) = vault_with_users(dir.path());
    assert!(matches!(
        vault.add_entry(99, &EntryFields::new("a.com", "u", "p")),
        Err(VaultError::UserNotFound { user_id: 99 })
    ));
    assert!(matches!(
        vault.list_entries(99),
        Err(VaultError::UserNotFound { .. })
    ));
}

#[test]
fn duplicate_registration_is_lifted() {
    let dir = tempfile::tempdir().unwrap();
    let (mut vault, _, _) = vault_with_users(dir.path());
    assert!(matches!(
        vault.register("ALICE@example.com", "other", "w"),
        Err(VaultError::DuplicateUser { .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════
//  Persistence
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn reopen_preserves_entries_and_counters() {
    let dir = tempfile::tempdir().unwrap();
    let (alice, last_id) = {
        let (mut vault, alice, _) = vault_with_users(dir.path());
        let mut last = 0;
        for i in 0..60 {
            last = vault
                .add_entry(alice, &EntryFields::new(format!("s{i}.com"), "u", format!("p{i}")))
                .unwrap();
        }
        assert!(vault.delete_entry(alice, last).unwrap());
        (alice, last)
    };

    let mut vault = open_vault(&config(dir.path())).unwrap();
    let listed = vault.list_entries(alice).unwrap();
    assert_eq!(listed.len(), 59);
    assert_eq!(listed[10].password.as_deref(), Some("p10"));

    // The deleted tail id is not reissued.
    let next = vault
        .add_entry(alice, &EntryFields::new("new.com", "u", "p"))
        .unwrap();
    assert_eq!(next, last_id + 1);

    // Logging in still works with the persisted account.
    let token = vault.login("alice@example.com", "pw-a").unwrap();
    assert_eq!(vault.validate_session(&token), Some(alice));
}

#[test]
fn lost_index_does_not_reissue_ids() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let alice = {
        let (mut vault, alice, _) = vault_with_users(dir.path());
        for i in 0..3 {
            vault
                .add_entry(alice, &EntryFields::new(format!("s{i}.com"), "u", "p"))
                .unwrap();
        }
        alice
    };
    std::fs::remove_file(cfg.index_path()).unwrap();

    let mut vault = open_vault(&cfg).unwrap();
    let id = vault
        .add_entry(alice, &EntryFields::new("after.com", "u", "p"))
        .unwrap();
    assert_eq!(id, 4);

    let stats = vault.index_stats().unwrap();
    assert_eq!(stats.unindexed_records, 3);
    let stats = vault.compact_index().unwrap();
    assert_eq!(stats.unindexed_records, 0);
    assert_eq!(stats.index_entries, 4);
}

#[test]
fn many_entries_split_index_and_stay_retrievable() {
    let dir = tempfile::tempdir().unwrap();
    let (mut vault, alice, bob) = vault_with_users(dir.path());
    for i in (0..150).rev() {
        let owner = if i % 2 == 0 { alice } else { bob };
        vault
            .add_entry(owner, &EntryFields::new(format!("host{i:03}.net"), "u", "p"))
            .unwrap();
    }
    let stats = vault.index_stats().unwrap();
    assert!(stats.height >= 2);
    assert_eq!(stats.live_keys, 150);

    let total = vault.list_entries(alice).unwrap().len() + vault.list_entries(bob).unwrap().len();
    assert_eq!(total, 150);
}

// ═══════════════════════════════════════════════════════════════════════
//  Strict decryption and the shared handle
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn strict_mode_from_config_fails_listing() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (mut vault, alice, _) = vault_with_users(dir.path());
        vault.add_entry(alice, &EntryFields::new("a.com", "u", "p")).unwrap();
    }
    let records = RecordStore::new(config(dir.path()).records_path(), StoreOptions::new());
    let mut all = records.load_all().unwrap();
    all[0].iv = "zz".into();
    records.replace_all(&all).unwrap();

    let lenient = open_vault(&config(dir.path())).unwrap();
    assert!(lenient.list_entries(1).unwrap()[0].is_masked());
    drop(lenient);

    let strict = open_vault(&config(dir.path()).with_strict_decrypt(true)).unwrap();
    assert!(matches!(
        strict.list_entries(1),
        Err(VaultError::DecryptionFailure { record_id: 1, .. })
    ));
}

#[tokio::test]
async fn shared_vault_serializes_mixed_operations() {
    let dir = tempfile::tempdir().unwrap();
    let vault = SharedVault::new(open_vault(&config(dir.path())).unwrap());
    let alice = vault
        .register("alice@example.com".into(), "pw".into(), "w".into())
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let vault = vault.clone();
        tasks.push(tokio::spawn(async move {
            let id = vault
                .add_entry(alice, EntryFields::new(format!("s{i}.com"), "u", "p"))
                .await?;
            if i % 2 == 0 {
                vault.delete_entry(alice, id).await?;
            } else {
                vault
                    .update_entry(alice, id, EntryFields::new(format!("s{i}.com"), "u", "new"))
                    .await?;
            }
            Ok::<_, VaultError>(id)
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let entries = vault.list_entries(alice).await.unwrap();
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.password.as_deref() == Some("new")));
    assert_eq!(
        vault
            .search_by_site(alice, "s1.com".into())
            .await
            .unwrap()
            .len(),
        1
    );
}
