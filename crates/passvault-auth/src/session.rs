//! In-memory session table.
//!
//! Sessions are not persisted: a restart logs everyone out. Tokens are 32
//! random bytes, hex-encoded. Expired entries are dropped lazily whenever a
//! token is validated.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use passvault_crypto::primitives::random_bytes;
use tracing::debug;

use crate::error::AuthResult;

/// Bytes of randomness in a session token.
pub const TOKEN_LEN: usize = 32;

/// A live login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct SessionTable {
    sessions: HashMap<String, Session>,
    ttl: Duration,
}

impl SessionTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
        }
    }

    /// Open a session for `user_id` starting at `now`.
    pub fn issue(&mut self, user_id: u64, now: DateTime<Utc>) -> AuthResult<String> {
        let token = hex_token()?;
        self.sessions.insert(
            token.clone(),
            Session {
                user_id,
                created_at: now,
                expires_at: now + self.ttl,
            },
        );
        Ok(token)
    }

    /// User id behind `token` if it is still live at `now`.
    pub fn validate(&mut self, token: &str, now: DateTime<Utc>) -> Option<u64> {
        self.prune(now);
        self.sessions.get(token).map(|s| s.user_id)
    }

    pub fn revoke(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Drop every session expired at `now`; returns how many went.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(now));
        let dropped = before - self.sessions.len();
        if dropped > 0 {
            debug!(dropped, "pruned expired sessions");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn hex_token() -> AuthResult<String> {
    Ok(hex::encode(random_bytes(TOKEN_LEN)?))
}
