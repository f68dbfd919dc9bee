//! Core data models.
//!
//! `Remote*` types mirror the JSON returned by the Mastodon API; the rest are
//! rows of the local SQLite store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::blob_to_vec;

/// Account entity as returned by `/api/v2/search` and embedded in statuses.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RemoteAccount {
    pub id: String,
    pub username: String,
    /// `user` for accounts on the queried instance, `user@domain` otherwise.
    pub acct: String,
    pub url: String,
    #[serde(default)]
    pub display_name: String,
}

/// Status entity as returned by `/api/v1/accounts/:id/statuses`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteStatus {
    pub id: String,
    pub uri: String,
    pub created_at: DateTime<Utc>,
    /// Sanitised HTML. Empty for boosts.
    #[serde(default)]
    pub content: String,
    pub account: RemoteAccount,
    /// The boosted status, present only on boosts.
    #[serde(default)]
    pub reblog: Option<serde_json::Value>,
}

impl RemoteStatus {
    /// Boosts carry someone else's words, even when `content` echoes them.
    pub fn is_boost(&self) -> bool {
        self.reblog.is_some()
    }
}

/// Stored account.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub url: String,
    pub acct: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Account {} ({})>", self.id, self.username)
    }
}

/// Stored account together with the number of statuses held for it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AccountSummary {
    pub id: String,
    pub username: String,
    pub url: String,
    pub acct: String,
    pub status_count: i64,
    pub updated_at: i64,
}

/// Stored status with its embedding.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Status {
    pub id: String,
    pub uri: String,
    pub account_id: String,
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<u8>,
    pub embedding_model: String,
    pub created_at: i64,
}

impl Status {
    pub fn embedding(&self) -> Vec<f32> {
        blob_to_vec(&self.embedding)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Status {} by {}>", self.id, self.account_id)
    }
}

/// A status ready to be written: remote fields plus its embedding.
#[derive(Debug, Clone)]
pub struct NewStatus {
    pub id: String,
    pub uri: String,
    pub account_id: String,
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
    pub created_at: i64,
}
