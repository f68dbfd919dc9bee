//! Account ingestion.
//!
//! Coordinates the add flow: resolve → fetch statuses → embed → store.
//! Re-adding an account is incremental: statuses whose content hash and
//! embedding model are both unchanged are neither re-embedded nor rewritten.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::context::AppContext;
use crate::embedding::embed_all;
use crate::error::{MastodoffError, Result};
use crate::lookup::require_username;
use crate::mastodon::fetch_statuses;
use crate::models::{Account, NewStatus, RemoteStatus};
use crate::store;
use crate::text::plain_text;

/// What [`add_account`] did.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub account: Account,
    /// Statuses returned by Mastodon.
    pub fetched: usize,
    /// Statuses newly embedded and written (new or edited).
    pub stored: usize,
    /// Statuses already stored with identical content and embedding model.
    pub unchanged: usize,
    /// Boosts and statuses with no text (media-only posts).
    pub skipped: usize,
}

/// Add (or refresh) `username` and up to `count` of its most recent statuses.
///
/// `count = None` falls back to `[ingest].default_count`, and fetches every
/// status when that is unset too.
pub async fn add_account(
    ctx: &AppContext,
    username: &str,
    count: Option<usize>,
) -> Result<IngestReport> {
    tracing::info!("Adding account {}...", username);
    let username = require_username(username)?;
    if count == Some(0) {
        return Err(MastodoffError::InvalidInput(
            "count must be at least 1".to_string(),
        ));
    }
    let count = count.or(ctx.config.ingest.default_count);

    let remote = ctx.social.search_account(username).await?;
    let statuses = fetch_statuses(ctx.social.as_ref(), &remote, count, ctx.page_limit()).await?;
    let fetched = statuses.len();

    let model = ctx.embedder.model_name().to_string();
    let known = store::status_hashes(&ctx.pool, &remote.id).await?;
    let mut pending = Vec::new();
    let mut texts = Vec::new();
    let mut unchanged = 0usize;
    let mut skipped = 0usize;

    for status in statuses {
        let text = plain_text(&status.content);
        if status.is_boost() || text.is_empty() {
            tracing::debug!(status = %status.id, "Skipping boost or status without text");
            skipped += 1;
            continue;
        }
        let hash = content_hash(&status.content);
        if let Some((stored_hash, stored_model)) = known.get(&status.id) {
            if *stored_hash == hash && *stored_model == model {
                unchanged += 1;
                continue;
            }
        }
        texts.push(text);
        pending.push((status, hash));
    }

    let embeddings = if texts.is_empty() {
        Vec::new()
    } else {
        embed_all(
            ctx.embedder.as_ref(),
            &texts,
            ctx.config.embedding.batch_size,
        )
        .await?
    };

    let mut tx = ctx.pool.begin().await?;
    let account = store::upsert_account(&mut tx, &remote).await?;
    for ((status, hash), embedding) in pending.iter().zip(embeddings) {
        store::upsert_status(&mut tx, &new_status(status, &remote.id, hash, embedding), &model)
            .await?;
    }
    tx.commit().await?;

    let report = IngestReport {
        account,
        fetched,
        stored: pending.len(),
        unchanged,
        skipped,
    };
    tracing::info!(
        fetched = report.fetched,
        stored = report.stored,
        unchanged = report.unchanged,
        skipped = report.skipped,
        "Done adding account."
    );
    Ok(report)
}

fn new_status(status: &RemoteStatus, account_id: &str, hash: &str, embedding: Vec<f32>) -> NewStatus {
    NewStatus {
        id: status.id.clone(),
        uri: status.uri.clone(),
        // Statuses listed under an account belong to it even when the
        // payload's nested account is a stale copy.
        account_id: account_id.to_string(),
        content: status.content.clone(),
        content_hash: hash.to_string(),
        embedding,
        created_at: status.created_at.timestamp(),
    }
}

pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_hex() {
        let a = content_hash("<p>hello</p>");
        assert_eq!(a, content_hash("<p>hello</p>"));
        assert_ne!(a, content_hash("<p>hello!</p>"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
