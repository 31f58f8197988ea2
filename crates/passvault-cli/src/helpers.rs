//! Shared helpers for the PassVault CLI.

use anyhow::{Context, Result, bail};
use passvault_auth::FileUserDirectory;
use passvault_core::{EntryFields, SharedVault, VaultConfig, VaultEntry, open_vault};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::cli::Credentials;

pub type Vault = SharedVault<FileUserDirectory>;

/// Install the global tracing subscriber. `RUST_LOG` wins over
/// `default_level`. Logs go to stderr so stdout stays pure JSON.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Open the vault named by `config` on the blocking pool.
pub async fn open(config: &VaultConfig) -> Result<Vault> {
    let config = config.clone();
    let coordinator = tokio::task::spawn_blocking(move || open_vault(&config))
        .await
        .context("vault open task failed")?
        .context("failed to open vault")?;
    Ok(SharedVault::new(coordinator))
}

/// Log in, resolve the session to a user id, run `op`, and log out again.
pub async fn with_session<F, Fut, T>(vault: &Vault, creds: &Credentials, op: F) -> Result<T>
where
    F: FnOnce(u64) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let token = vault
        .login(creds.email.clone(), creds.password.clone())
        .await
        .context("login failed")?;

    let Some(user_id) = vault.validate_session(token.clone()).await? else {
        bail!("session expired before it could be used");
    };

    let result = op(user_id).await;
    vault.logout(token).await?;
    result
}

/// Merge optional overrides onto an existing entry.
pub fn merge_update(
    current: &VaultEntry,
    site: Option<String>,
    username: Option<String>,
    secret: Option<String>,
    notes: Option<String>,
    category: Option<String>,
) -> Result<EntryFields> {
    let password = match (secret, &current.password) {
        (Some(new), _) => new,
        (None, Some(old)) => old.clone(),
        (None, None) => bail!(
            "entry {} cannot be decrypted; pass --secret to replace it",
            current.record_id
        ),
    };
    Ok(EntryFields {
        site_name: site.unwrap_or_else(|| current.site_name.clone()),
        username: username.unwrap_or_else(|| current.username.clone()),
        password,
        notes: notes.unwrap_or_else(|| current.notes.clone()),
        category: category.unwrap_or_else(|| current.category.clone()),
    })
}

/// Print `value` to stdout as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}
