//! CLI entry point for PassVault.
//!
//! This binary provides the `passvault` command: account registration, vault
//! entry management on behalf of a logged-in user, and index maintenance.

mod cli;
mod helpers;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use passvault_core::{EntryFields, VaultConfig};
use serde_json::json;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::helpers::{Vault, init_tracing, merge_update, open, print_json, with_session};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = VaultConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    init_tracing(&config.log_level);

    info!(data_dir = %config.data_dir.display(), "starting passvault");
    let vault = open(&config).await?;

    match cli.command {
        Commands::Register {
            creds,
            recovery_phrase,
        } => {
            let user_id = vault
                .register(creds.email.clone(), creds.password, recovery_phrase)
                .await
                .context("registration failed")?;
            print_json(&json!({ "user_id": user_id, "email": creds.email }))
        }

        Commands::Add {
            creds,
            site,
            username,
            secret,
            notes,
            category,
        } => {
            let entry = EntryFields::new(site, username, secret)
                .with_notes(notes)
                .with_category(category);
            let v = vault.clone();
            let record_id = with_session(&vault, &creds, |user_id| async move {
                Ok(v.add_entry(user_id, entry).await?)
            })
            .await?;
            print_json(&json!({ "record_id": record_id }))
        }

        Commands::List { creds } => {
            let v = vault.clone();
            let entries = with_session(&vault, &creds, |user_id| async move {
                Ok(v.list_entries(user_id).await?)
            })
            .await?;
            print_json(&entries)
        }

        Commands::Search { creds, site } => {
            let v = vault.clone();
            let entries = with_session(&vault, &creds, |user_id| async move {
                Ok(v.search_by_site(user_id, site).await?)
            })
            .await?;
            print_json(&entries)
        }

        Commands::Get { creds, id } => {
            let v = vault.clone();
            let entry = with_session(&vault, &creds, |user_id| async move {
                v.get_entry(user_id, id)
                    .await?
                    .ok_or_else(|| anyhow!("no entry with id {id}"))
            })
            .await?;
            print_json(&entry)
        }

        Commands::Update {
            creds,
            id,
            site,
            username,
            secret,
            notes,
            category,
        } => {
            let v = vault.clone();
            with_session(&vault, &creds, |user_id| async move {
                let current = v
                    .get_entry(user_id, id)
                    .await?
                    .ok_or_else(|| anyhow!("no entry with id {id}"))?;
                let entry = merge_update(&current, site, username, secret, notes, category)?;
                if !v.update_entry(user_id, id, entry).await? {
                    return Err(anyhow!("entry {id} disappeared during update"));
                }
                Ok(())
            })
            .await?;
            print_json(&json!({ "record_id": id, "updated": true }))
        }

        Commands::Delete { creds, id } => {
            let v = vault.clone();
            let deleted = with_session(&vault, &creds, |user_id| async move {
                Ok(v.delete_entry(user_id, id).await?)
            })
            .await?;
            print_json(&json!({ "record_id": id, "deleted": deleted }))
        }

        Commands::Compact => {
            let stats = vault.compact_index().await.context("compaction failed")?;
            print_json(&stats)
        }

        Commands::Stats => print_stats(&vault).await,
    }
}

async fn print_stats(vault: &Vault) -> Result<()> {
    let stats = vault.index_stats().await.context("failed to read index")?;
    print_json(&stats)
}
