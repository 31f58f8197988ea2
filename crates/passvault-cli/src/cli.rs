//! CLI argument definitions for PassVault.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// PassVault -- an encrypted, multi-user password vault.
#[derive(Parser)]
#[command(
    name = "passvault",
    version,
    about = "PassVault -- encrypted multi-user password vault",
    long_about = "Stores per-user vault entries on disk with every password sealed \
                  under its owner's key. All output is JSON."
)]
pub struct Cli {
    /// TOML configuration file. Missing files fall back to defaults.
    #[arg(long, short, env = "PASSVAULT_CONFIG", default_value = "passvault.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Account credentials used to open a session for one command.
#[derive(Args, Clone)]
pub struct Credentials {
    #[arg(long, env = "PASSVAULT_EMAIL")]
    pub email: String,

    #[arg(long, env = "PASSVAULT_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a user account.
    Register {
        #[command(flatten)]
        creds: Credentials,

        /// Phrase that can later prove ownership of the account.
        #[arg(long, default_value = "")]
        recovery_phrase: String,
    },

    /// Add a vault entry.
    Add {
        #[command(flatten)]
        creds: Credentials,

        #[arg(long)]
        site: String,

        #[arg(long, default_value = "")]
        username: String,

        /// The password to store.
        #[arg(long, env = "PASSVAULT_SECRET", hide_env_values = true)]
        secret: String,

        #[arg(long, default_value = "")]
        notes: String,

        #[arg(long, default_value = "")]
        category: String,
    },

    /// List every entry of the account.
    List {
        #[command(flatten)]
        creds: Credentials,
    },

    /// List entries for one site (exact match).
    Search {
        #[command(flatten)]
        creds: Credentials,

        #[arg(long)]
        site: String,
    },

    /// Show one entry.
    Get {
        #[command(flatten)]
        creds: Credentials,

        #[arg(long)]
        id: u64,
    },

    /// Change an entry. Omitted fields keep their current value.
    Update {
        #[command(flatten)]
        creds: Credentials,

        #[arg(long)]
        id: u64,

        #[arg(long)]
        site: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        secret: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        category: Option<String>,
    },

    /// Delete an entry.
    Delete {
        #[command(flatten)]
        creds: Credentials,

        #[arg(long)]
        id: u64,
    },

    /// Rebuild the site index from the live records.
    Compact,

    /// Report index and record file statistics.
    Stats,
}
