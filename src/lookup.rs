//! Reading stored accounts by username.
//!
//! A username is first matched against the handles already in the
//! database. Only when that fails is Mastodon asked to resolve it, and the
//! resulting account id looked up locally. Either way an account that was
//! never added is [`DatabaseError::NotInDatabase`].

use crate::context::AppContext;
use crate::error::{DatabaseError, MastodoffError, Result};
use crate::models::{Account, Status};
use crate::store;

/// The stored account for `username`.
pub async fn get_db_account(ctx: &AppContext, username: &str) -> Result<Account> {
    tracing::info!("Getting database info for username {}...", username);
    let username = require_username(username)?;

    if let Some(account) = store::find_account_by_handle(&ctx.pool, username).await? {
        return Ok(account);
    }

    let remote = ctx.social.search_account(username).await?;
    store::find_account_by_id(&ctx.pool, &remote.id)
        .await?
        .ok_or_else(|| {
            DatabaseError::NotInDatabase {
                username: username.to_string(),
            }
            .into()
        })
}

/// The stored account for `username` together with its statuses, newest first.
pub async fn get_db_account_with_statuses(
    ctx: &AppContext,
    username: &str,
) -> Result<(Account, Vec<Status>)> {
    let account = get_db_account(ctx, username).await?;
    let statuses = store::statuses_for(&ctx.pool, &account.id).await?;
    Ok((account, statuses))
}

/// Raw content of every stored status for `username`.
pub async fn get_db_statuses(ctx: &AppContext, username: &str) -> Result<Vec<String>> {
    tracing::info!("Getting database statuses for username {}...", username);
    let (_, statuses) = get_db_account_with_statuses(ctx, username).await?;
    Ok(statuses.into_iter().map(|s| s.content).collect())
}

/// Embedding of every stored status for `username`.
pub async fn get_db_embeddings(ctx: &AppContext, username: &str) -> Result<Vec<Vec<f32>>> {
    tracing::info!("Getting database embeddings for username {}...", username);
    let account = get_db_account(ctx, username).await?;
    store::embeddings_for(&ctx.pool, &account.id).await
}

pub(crate) fn require_username(username: &str) -> Result<&str> {
    let trimmed = username.trim();
    if trimmed.trim_start_matches('@').is_empty() {
        return Err(MastodoffError::InvalidInput(
            "username must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}
