//! Schema creation and full reset.

use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            url TEXT NOT NULL,
            acct TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS statuses (
            id TEXT PRIMARY KEY,
            uri TEXT NOT NULL,
            account_id TEXT NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            embedding_model TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_statuses_account_id ON statuses(account_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_acct ON accounts(acct COLLATE NOCASE)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Drop every table and recreate the schema. All accounts and statuses are lost.
pub async fn reset_database(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DROP TABLE IF EXISTS statuses")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS accounts")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::warn!("Database reset: all accounts and statuses dropped");
    run_migrations(pool).await
}
