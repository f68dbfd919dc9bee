//! Mastodon REST API client.
//!
//! Talks to a single instance configured by `[mastodon].api_base_url`.
//! Only the handful of endpoints the service needs are covered:
//!
//! | Method | Path | Used for |
//! |--------|------|----------|
//! | `POST` | `/api/v1/apps` | registering this client (once, cached on disk) |
//! | `POST` | `/oauth/token` | password-grant login (once, cached on disk) |
//! | `GET`  | `/api/v2/search` | resolving a username to an account |
//! | `GET`  | `/api/v1/accounts/:id/statuses` | paging through an account's statuses |
//!
//! Rate limiting follows a "throw" policy: a 429 becomes
//! [`ApiError::RateLimited`] immediately and nothing is retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config::MastodonConfig;
use crate::error::{ApiError, MastodoffError, Result};
use crate::models::{RemoteAccount, RemoteStatus};

const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
const SCOPES: &str = "read";

/// The remote operations the rest of the crate depends on.
///
/// Implemented over HTTP by [`MastodonClient`].
#[async_trait]
pub trait SocialApi: Send + Sync {
    /// Resolve a username (`user`, `@user`, `user@domain`, `@user@domain`)
    /// to an account. Zero results is [`ApiError::NoSearchResults`].
    async fn search_account(&self, username: &str) -> Result<RemoteAccount>;

    /// One page of an account's statuses, newest first, strictly older than
    /// `max_id` when given.
    async fn account_statuses(
        &self,
        account_id: &str,
        max_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RemoteStatus>>;
}

/// Page through an account's statuses.
///
/// Each page is requested with `max_id` set to the id of the last status of
/// the previous page. Stops on an empty page, or once at least `count`
/// statuses have been collected, and returns at most `count` statuses. With
/// `count = None` every status the server will hand out is returned.
pub async fn fetch_statuses(
    api: &dyn SocialApi,
    account: &RemoteAccount,
    count: Option<usize>,
    limit: u32,
) -> Result<Vec<RemoteStatus>> {
    tracing::info!("Getting statuses for account id {}...", account.id);
    let mut full_statuses: Vec<RemoteStatus> = Vec::new();
    let mut max_id: Option<String> = None;

    loop {
        tracing::debug!(
            "Getting statuses for account id {} with max_id={:?}. Current count: {}",
            account.id,
            max_id,
            full_statuses.len()
        );
        let page = api
            .account_statuses(&account.id, max_id.as_deref(), limit)
            .await?;
        match page.last() {
            Some(last) => max_id = Some(last.id.clone()),
            None => break,
        }
        full_statuses.extend(page);

        if count.is_some_and(|c| c <= full_statuses.len()) {
            break;
        }
    }

    tracing::info!("Got {} statuses.", full_statuses.len());
    if let Some(c) = count {
        full_statuses.truncate(c);
    }
    Ok(full_statuses)
}

/// Resolve a username and fetch its statuses in one go.
pub async fn fetch_statuses_by_username(
    api: &dyn SocialApi,
    username: &str,
    count: Option<usize>,
    limit: u32,
) -> Result<Vec<RemoteStatus>> {
    let account = api.search_account(username).await?;
    fetch_statuses(api, &account, count, limit).await
}

/// Client id and secret returned by `/api/v1/apps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Access token returned by `/oauth/token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
}

#[derive(Deserialize)]
struct SearchResults {
    #[serde(default)]
    accounts: Vec<RemoteAccount>,
}

/// HTTP client for one Mastodon instance.
pub struct MastodonClient {
    base_url: String,
    http: reqwest::Client,
    token: Option<String>,
    authenticated_statuses: bool,
}

impl MastodonClient {
    /// An unauthenticated client.
    pub fn anonymous(config: &MastodonConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            http: build_http(config)?,
            token: None,
            authenticated_statuses: false,
        })
    }

    /// Build the client for `config`.
    ///
    /// When `mastodon.username` is set the app is registered and logged in
    /// (each step only if its credentials file does not exist yet) and the
    /// resulting token is used for searches. Otherwise the client stays
    /// anonymous.
    pub async fn connect(config: &MastodonConfig) -> Result<Self> {
        let mut client = Self::anonymous(config)?;
        if config.username.is_some() {
            let token = client.ensure_token(config).await?;
            client.token = Some(token.access_token);
            client.authenticated_statuses = config.authenticated_statuses;
        }
        Ok(client)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Host part of the instance URL, used to qualify local handles.
    pub fn instance_host(&self) -> &str {
        let without_scheme = self
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.base_url);
        without_scheme.split('/').next().unwrap_or(without_scheme)
    }

    /// Register the app and log in as needed, returning the cached or fresh token.
    pub async fn ensure_token(&self, config: &MastodonConfig) -> Result<AccessToken> {
        let credentials = match read_json::<ClientCredentials>(&config.secret_file)? {
            Some(c) => c,
            None => {
                tracing::info!("Creating Mastodon app...");
                let c = self.register_app(config).await?;
                write_json(&config.secret_file, &c)?;
                c
            }
        };

        if let Some(token) = read_json::<AccessToken>(&config.token_file)? {
            return Ok(token);
        }

        tracing::info!("Getting Mastodon token...");
        let username = config.username.as_deref().ok_or_else(|| {
            MastodoffError::Config("mastodon.username is required to log in".to_string())
        })?;
        let password = std::env::var(&config.password_env).map_err(|_| {
            MastodoffError::Config(format!(
                "{} environment variable not set",
                config.password_env
            ))
        })?;
        let token = self.log_in(&credentials, username, &password).await?;
        write_json(&config.token_file, &token)?;
        Ok(token)
    }

    async fn register_app(&self, config: &MastodonConfig) -> Result<ClientCredentials> {
        let mut form = vec![
            ("client_name", config.client_name.as_str()),
            ("redirect_uris", REDIRECT_URI),
            ("scopes", SCOPES),
        ];
        if let Some(ref website) = config.website {
            form.push(("website", website.as_str()));
        }

        let response = self
            .http
            .post(format!("{}/api/v1/apps", self.base_url))
            .form(&form)
            .send()
            .await
            .map_err(ApiError::from)?;
        decode(check(response).await?).await
    }

    async fn log_in(
        &self,
        credentials: &ClientCredentials,
        username: &str,
        password: &str,
    ) -> Result<AccessToken> {
        let form = [
            ("grant_type", "password"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("username", username),
            ("password", password),
            ("scope", SCOPES),
        ];
        let response = self
            .http
            .post(format!("{}/oauth/token", self.base_url))
            .form(&form)
            .send()
            .await
            .map_err(ApiError::from)?;
        decode(check(response).await?).await
    }

    fn get(&self, path: &str, with_token: bool) -> reqwest::RequestBuilder {
        let request = self.http.get(format!("{}{}", self.base_url, path));
        match (&self.token, with_token) {
            (Some(token), true) => request.bearer_auth(token),
            _ => request,
        }
    }
}

#[async_trait]
impl SocialApi for MastodonClient {
    async fn search_account(&self, username: &str) -> Result<RemoteAccount> {
        tracing::info!("Getting account for username {}...", username);
        let query = username.trim();
        let mut params = vec![("q", query), ("type", "accounts"), ("limit", "10")];
        // Resolving unknown remote accounts (WebFinger) needs a token.
        if self.is_authenticated() {
            params.push(("resolve", "true"));
        }

        let response = self
            .get("/api/v2/search", true)
            .query(&params)
            .send()
            .await
            .map_err(ApiError::from)?;
        let results: SearchResults = decode(check(response).await?).await?;

        select_account(results.accounts, query, self.instance_host()).ok_or_else(|| {
            ApiError::NoSearchResults {
                username: username.to_string(),
            }
            .into()
        })
    }

    async fn account_statuses(
        &self,
        account_id: &str,
        max_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RemoteStatus>> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(max_id) = max_id {
            params.push(("max_id", max_id.to_string()));
        }

        let response = self
            .get(
                &format!("/api/v1/accounts/{}/statuses", account_id),
                self.authenticated_statuses,
            )
            .query(&params)
            .send()
            .await
            .map_err(ApiError::from)?;
        decode(check(response).await?).await
    }
}

/// Pick the best search hit: an exact handle match if there is one,
/// otherwise the first result.
///
/// `query` may carry a leading `@`. Local accounts report `acct` without a
/// domain, so `alice` on `example.social` also matches `alice@example.social`.
pub fn select_account(
    accounts: Vec<RemoteAccount>,
    query: &str,
    instance_host: &str,
) -> Option<RemoteAccount> {
    let wanted = query.trim().trim_start_matches('@').to_lowercase();
    let is_exact = |account: &RemoteAccount| {
        let acct = account.acct.to_lowercase();
        acct == wanted || (!acct.contains('@') && format!("{}@{}", acct, instance_host) == wanted)
    };

    match accounts.iter().position(is_exact) {
        Some(i) => accounts.into_iter().nth(i),
        None => accounts.into_iter().next(),
    }
}

fn build_http(config: &MastodonConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("mastodoff/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ApiError::from(e).into())
}

/// Map 429 and other failures to [`ApiError`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.as_u16() == 429 {
        let reset = response
            .headers()
            .get("X-RateLimit-Reset")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        return Err(ApiError::RateLimited { reset }.into());
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    }
    .into())
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()).into())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| MastodoffError::io("read", path, e))?;
    serde_json::from_str(&content).map(Some).map_err(|e| {
        MastodoffError::Config(format!("corrupt credentials file {}: {}", path.display(), e))
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| MastodoffError::io("create", parent, e))?;
    }
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| MastodoffError::Config(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| MastodoffError::io("write", path, e))
}
