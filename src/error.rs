//! Error types for Mastodoff operations.
//!
//! The hierarchy is shallow: a base [`MastodoffError`] with one
//! variant per failure domain. Mastodon API failures live under [`ApiError`]
//! and database failures under [`DatabaseError`], so route handlers can turn
//! "account not found" style errors into a 404 page while anything else
//! becomes a generic failure message.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used by every library operation.
pub type Result<T> = std::result::Result<T, MastodoffError>;

/// Base error for the application.
#[derive(Error, Debug)]
pub enum MastodoffError {
    /// The Mastodon API call failed or returned nothing useful.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The local database failed or does not hold the requested data.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// The embedding provider failed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The training data cannot be used to fit a classifier.
    #[error("Cannot train classifier: {0}")]
    Classifier(String),

    /// A user-supplied parameter was missing or malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reading or writing a credentials file failed.
    #[error("Failed to {operation} '{path}': {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration does not allow the requested operation.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised while talking to the Mastodon API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// An account search returned no results.
    #[error("No results for account search with username {username}")]
    NoSearchResults { username: String },

    /// The server answered 429. Requests are never retried.
    #[error("Mastodon rate limit reached{}", .reset.as_deref().map(|r| format!(" (resets at {r})")).unwrap_or_default())]
    RateLimited { reset: Option<String> },

    /// Any other non-success HTTP status.
    #[error("Mastodon API error {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, timeout, or TLS failure.
    #[error("Mastodon request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("Unexpected Mastodon response: {0}")]
    Decode(String),
}

/// Errors raised by the local store.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The account exists remotely (or was asked for) but was never added.
    #[error("No information in database for account with username {username}")]
    NotInDatabase { username: String },

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl From<sqlx::Error> for MastodoffError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(DatabaseError::Sqlx(err))
    }
}

impl MastodoffError {
    /// True for errors that mean "the thing you asked about does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Api(ApiError::NoSearchResults { .. })
                | Self::Database(DatabaseError::NotInDatabase { .. })
        )
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
