//! Queries over the `accounts` and `statuses` tables.

use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::models::{Account, AccountSummary, NewStatus, RemoteAccount, Status};

/// Insert the account, or refresh its username/URL/handle if it already exists.
pub async fn upsert_account(
    tx: &mut Transaction<'_, Sqlite>,
    remote: &RemoteAccount,
) -> Result<Account> {
    let now = chrono::Utc::now().timestamp();
    let account = sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (id, username, url, acct, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            username = excluded.username,
            url = excluded.url,
            acct = excluded.acct,
            updated_at = excluded.updated_at
        RETURNING id, username, url, acct, created_at, updated_at
        "#,
    )
    .bind(&remote.id)
    .bind(&remote.username)
    .bind(&remote.url)
    .bind(&remote.acct)
    .bind(now)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;

    Ok(account)
}

/// Insert a status, or replace its content and embedding if the id exists.
pub async fn upsert_status(
    tx: &mut Transaction<'_, Sqlite>,
    status: &NewStatus,
    model: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO statuses (id, uri, account_id, content, content_hash, embedding, embedding_model, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            uri = excluded.uri,
            content = excluded.content,
            content_hash = excluded.content_hash,
            embedding = excluded.embedding,
            embedding_model = excluded.embedding_model
        "#,
    )
    .bind(&status.id)
    .bind(&status.uri)
    .bind(&status.account_id)
    .bind(&status.content)
    .bind(&status.content_hash)
    .bind(vec_to_blob(&status.embedding))
    .bind(model)
    .bind(status.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn find_account_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>(
        "SELECT id, username, url, acct, created_at, updated_at FROM accounts WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(account)
}

/// Look up a stored account by handle, ignoring case and a leading `@`.
///
/// Matches `acct` exactly, or `username` for local accounts when the handle
/// has no domain part. Returns `None` if nothing (or more than one account)
/// matches.
pub async fn find_account_by_handle(pool: &SqlitePool, handle: &str) -> Result<Option<Account>> {
    let handle = handle.trim().trim_start_matches('@');
    if handle.is_empty() {
        return Ok(None);
    }

    let mut matches = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, username, url, acct, created_at, updated_at FROM accounts
        WHERE acct = ? COLLATE NOCASE
           OR (instr(?, '@') = 0 AND instr(acct, '@') = 0 AND username = ? COLLATE NOCASE)
        LIMIT 2
        "#,
    )
    .bind(handle)
    .bind(handle)
    .bind(handle)
    .fetch_all(pool)
    .await?;

    if matches.len() == 1 {
        Ok(matches.pop())
    } else {
        Ok(None)
    }
}

/// All stored accounts with their status counts, most recently refreshed first.
pub async fn list_accounts(pool: &SqlitePool) -> Result<Vec<AccountSummary>> {
    let accounts = sqlx::query_as::<_, AccountSummary>(
        r#"
        SELECT a.id, a.username, a.url, a.acct, a.updated_at,
               COUNT(s.id) AS status_count
        FROM accounts a
        LEFT JOIN statuses s ON s.account_id = a.id
        GROUP BY a.id
        ORDER BY a.updated_at DESC, a.acct ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(accounts)
}

/// `(content_hash, embedding_model)` of every stored status of an account,
/// keyed by status id.
pub async fn status_hashes(
    pool: &SqlitePool,
    account_id: &str,
) -> Result<HashMap<String, (String, String)>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT id, content_hash, embedding_model FROM statuses WHERE account_id = ?",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, hash, model)| (id, (hash, model)))
        .collect())
}

/// An account's statuses, newest first.
pub async fn statuses_for(pool: &SqlitePool, account_id: &str) -> Result<Vec<Status>> {
    let statuses = sqlx::query_as::<_, Status>(
        r#"
        SELECT id, uri, account_id, content, content_hash, embedding, embedding_model, created_at
        FROM statuses WHERE account_id = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    Ok(statuses)
}

/// An account's embedding vectors, in the same order as [`statuses_for`].
pub async fn embeddings_for(pool: &SqlitePool, account_id: &str) -> Result<Vec<Vec<f32>>> {
    let blobs: Vec<Vec<u8>> = sqlx::query_scalar(
        "SELECT embedding FROM statuses WHERE account_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    Ok(blobs.iter().map(|b| blob_to_vec(b)).collect())
}
