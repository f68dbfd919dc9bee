//! Shared handles used by every operation.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::mastodon::{MastodonClient, SocialApi};
use crate::migrate;

/// Configuration, database pool and the two remote APIs.
///
/// Cheap to clone; the HTTP server keeps one in its router state and the CLI
/// builds one per invocation.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub social: Arc<dyn SocialApi>,
    pub embedder: Arc<dyn Embedder>,
}

impl AppContext {
    pub fn new(
        config: Config,
        pool: SqlitePool,
        social: Arc<dyn SocialApi>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            pool,
            social,
            embedder,
        }
    }

    /// Open the database (creating the schema if needed) and build the
    /// Mastodon client and embedder described by `config`.
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;

        tracing::info!("Instantiating Mastodon client for {}...", config.mastodon.api_base_url);
        let social = MastodonClient::connect(&config.mastodon).await?;

        tracing::info!("Instantiating {} embedder...", config.embedding.provider);
        let embedder = create_embedder(&config.embedding)?;

        Ok(Self::new(config, pool, Arc::new(social), embedder))
    }

    /// Statuses per page requested from Mastodon.
    pub fn page_limit(&self) -> u32 {
        self.config.mastodon.page_limit
    }
}
