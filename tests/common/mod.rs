//! Shared fixtures: in-process mock Mastodon and embedding APIs.
//!
//! Both mocks are axum routers served on ephemeral ports, so the real
//! reqwest-based clients are exercised end to end.

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use mastodoff::config::{parse_config, Config};
use mastodoff::context::AppContext;
use mastodoff::embedding::{ApiKind, HttpEmbedder};
use mastodoff::mastodon::MastodonClient;
use mastodoff::{db, migrate};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const API_KEY: &str = "test-key";
pub const PASSWORD: &str = "hunter2";

/// Serve `router` on 127.0.0.1 and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

// ─── Mock Mastodon ──────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockMastodon {
    pub accounts: Arc<Mutex<Vec<Value>>>,
    /// Statuses per account id, newest first.
    pub statuses: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    pub status_requests: Arc<AtomicUsize>,
    pub authorized_searches: Arc<AtomicUsize>,
    pub app_registrations: Arc<AtomicUsize>,
}

pub fn account_json(id: &str, acct: &str) -> Value {
    let username = acct.split('@').next().unwrap();
    json!({
        "id": id,
        "username": username,
        "acct": acct,
        "url": format!("https://mock.local/@{}", acct),
        "display_name": username,
    })
}

pub fn status_json(id: u64, account: &Value, content: &str) -> Value {
    json!({
        "id": id.to_string(),
        "uri": format!("https://mock.local/users/{}/statuses/{}", account["username"].as_str().unwrap(), id),
        "created_at": format!("2024-01-{:02}T12:00:00.000Z", (id % 28) + 1),
        "content": content,
        "account": account,
        "reblog": if content.is_empty() { json!({"id": "1"}) } else { Value::Null },
    })
}

impl MockMastodon {
    /// alice (cats), bob (rockets), carol (never added), dave (boosts only).
    pub fn populated() -> Self {
        let mock = Self::default();

        let alice = account_json("100", "alice");
        mock.add_account(
            &alice,
            &[
                (1006, "<p>My cat knocked the plant over again</p>"),
                (1005, "<p>Kitten update: she learned to purr on command</p>"),
                (1004, "<p>Cat tax &amp; coffee this morning</p>"),
                (1003, "<p>Meow. The cat has opinions about Mondays</p>"),
                (1002, ""),
                (1001, "<p>Two cats, one sunbeam<br />nobody wins</p>"),
            ],
        );

        let bob = account_json("200", "bob@remote.example");
        mock.add_account(
            &bob,
            &[
                (2004, "<p>Watching the rocket launch from the beach</p>"),
                (2003, "<p>Booster landed. Orbit achieved!</p>"),
                (2002, "<p>Rocket engines are loud</p>"),
                (2001, "<p>Another launch window tomorrow</p>"),
            ],
        );

        let carol = account_json("300", "carol");
        mock.add_account(&carol, &[(3001, "<p>Hello from carol</p>")]);

        let dave = account_json("400", "dave");
        mock.add_account(&dave, &[(4002, ""), (4001, "")]);
        // Some servers echo the boosted text in `content`.
        mock.edit_status("400", 4002, "<p>RT: my cat has opinions too</p>");

        mock
    }

    pub fn add_account(&self, account: &Value, statuses: &[(u64, &str)]) {
        self.accounts.lock().unwrap().push(account.clone());
        let list = statuses
            .iter()
            .map(|(id, content)| status_json(*id, account, content))
            .collect();
        self.statuses
            .lock()
            .unwrap()
            .insert(account["id"].as_str().unwrap().to_string(), list);
    }

    /// Replace the content of one status, as an edit would.
    pub fn edit_status(&self, account_id: &str, status_id: u64, content: &str) {
        let mut statuses = self.statuses.lock().unwrap();
        let list = statuses.get_mut(account_id).unwrap();
        for status in list.iter_mut() {
            if status["id"] == json!(status_id.to_string()) {
                status["content"] = json!(content);
            }
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/v2/search", get(mock_search))
            .route("/api/v1/accounts/{id}/statuses", get(mock_statuses))
            .route("/api/v1/apps", post(mock_register_app))
            .route("/oauth/token", post(mock_token))
            .with_state(self.clone())
    }
}

async fn mock_search(
    State(mock): State<MockMastodon>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if headers.get("authorization").is_some() {
        mock.authorized_searches.fetch_add(1, Ordering::SeqCst);
    }
    let needle = params
        .get("q")
        .map(|q| q.trim().trim_start_matches('@').to_lowercase())
        .unwrap_or_default();

    if needle == "limited" {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [("X-RateLimit-Reset", "2030-01-01T00:00:00.000Z")],
            "Too many requests",
        )
            .into_response();
    }

    let accounts: Vec<Value> = mock
        .accounts
        .lock()
        .unwrap()
        .iter()
        .filter(|a| {
            let acct = a["acct"].as_str().unwrap().to_lowercase();
            !needle.is_empty() && (acct.contains(&needle) || needle.contains(&acct))
        })
        .cloned()
        .collect();

    Json(json!({ "accounts": accounts, "statuses": [], "hashtags": [] })).into_response()
}

async fn mock_statuses(
    State(mock): State<MockMastodon>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    mock.status_requests.fetch_add(1, Ordering::SeqCst);
    let limit = params
        .get("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(20);
    let max_id = params.get("max_id").and_then(|m| m.parse::<u64>().ok());

    let all = match mock.statuses.lock().unwrap().get(&id) {
        Some(list) => list.clone(),
        None => return (StatusCode::NOT_FOUND, "Record not found").into_response(),
    };
    let page: Vec<Value> = all
        .into_iter()
        .filter(|s| {
            let status_id: u64 = s["id"].as_str().unwrap().parse().unwrap();
            max_id.map_or(true, |max| status_id < max)
        })
        .take(limit)
        .collect();

    Json(Value::Array(page)).into_response()
}

async fn mock_register_app(
    State(mock): State<MockMastodon>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    mock.app_registrations.fetch_add(1, Ordering::SeqCst);
    if form.get("client_name").map(String::as_str) != Some("mastodoff") {
        return (StatusCode::UNPROCESSABLE_ENTITY, "client_name missing").into_response();
    }
    Json(json!({
        "id": "1",
        "name": "mastodoff",
        "client_id": "cid",
        "client_secret": "csecret",
    }))
    .into_response()
}

async fn mock_token(Form(form): Form<HashMap<String, String>>) -> Response {
    let ok = form.get("grant_type").map(String::as_str) == Some("password")
        && form.get("client_id").map(String::as_str) == Some("cid")
        && form.get("client_secret").map(String::as_str) == Some("csecret")
        && form.get("password").map(String::as_str) == Some(PASSWORD);
    if !ok {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response();
    }
    Json(json!({
        "access_token": "tok",
        "token_type": "Bearer",
        "scope": "read",
        "created_at": 0,
    }))
    .into_response()
}

// ─── Mock embedding API ─────────────────────────────────────────────

/// Counts of texts embedded by the mock.
#[derive(Clone, Default)]
pub struct MockEmbeddings {
    pub texts_embedded: Arc<AtomicUsize>,
    /// Every request received, including failed ones.
    pub requests: Arc<AtomicUsize>,
    /// Remaining requests to answer with 503 before serving normally.
    pub unavailable_for: Arc<AtomicUsize>,
}

/// Three features: cat words, rocket words, constant.
pub fn featurize(text: &str) -> Vec<f32> {
    let mut cats = 0.0;
    let mut rockets = 0.0;
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if ["cat", "kitten", "purr", "meow"].iter().any(|p| word.starts_with(p)) {
            cats += 1.0;
        }
        if ["rocket", "launch", "orbit", "booster"].iter().any(|p| word.starts_with(p)) {
            rockets += 1.0;
        }
    }
    vec![cats, rockets, 0.5]
}

impl MockEmbeddings {
    /// Answer the next `n` requests with 503 Service Unavailable.
    pub fn fail_next(&self, n: usize) {
        self.unavailable_for.store(n, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Count the request and decide whether it should fail.
    fn unavailable(&self) -> Option<Response> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.unavailable_for
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| (StatusCode::SERVICE_UNAVAILABLE, "try again later").into_response())
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/embed/sentences/{model}", post(mock_basilica))
            .route("/v1/embeddings", post(mock_openai))
            .with_state(self.clone())
    }
}

fn texts_of(body: &Value, field: &str) -> Vec<String> {
    body[field]
        .as_array()
        .map(|a| a.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

async fn mock_basilica(
    State(mock): State<MockEmbeddings>,
    Path(model): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(res) = mock.unavailable() {
        return res;
    }
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !authorized || model != "twitter" {
        return (StatusCode::UNAUTHORIZED, "bad credentials").into_response();
    }
    let texts = texts_of(&body, "data");
    mock.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
    let embeddings: Vec<Vec<f32>> = texts.iter().map(|t| featurize(t)).collect();
    Json(json!({ "embeddings": embeddings })).into_response()
}

async fn mock_openai(
    State(mock): State<MockEmbeddings>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(res) = mock.unavailable() {
        return res;
    }
    let expected = format!("Bearer {}", API_KEY);
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    let texts = texts_of(&body, "input");
    mock.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
    // Deliberately reversed: clients must order by `index`.
    let data: Vec<Value> = texts
        .iter()
        .enumerate()
        .rev()
        .map(|(i, t)| json!({ "index": i, "embedding": featurize(t) }))
        .collect();
    Json(json!({ "object": "list", "data": data })).into_response()
}

// ─── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub ctx: AppContext,
    pub mastodon: MockMastodon,
    pub embeddings: MockEmbeddings,
    pub mastodon_url: String,
    pub _tmp: TempDir,
}

pub fn test_config(tmp: &TempDir, mastodon_url: &str, embed_url: &str, extra: &str) -> Config {
    let toml = format!(
        r#"
[db]
path = "{root}/data/mastodoff.sqlite"

[server]
bind = "127.0.0.1:0"

[mastodon]
api_base_url = "{mastodon_url}"
secret_file = "{root}/data/client.json"
token_file = "{root}/data/token.json"
page_limit = 2
timeout_secs = 5

[embedding]
provider = "basilica"
model = "twitter"
dims = 3
url = "{embed_url}"
batch_size = 2
max_retries = 0
timeout_secs = 5
{extra}
"#,
        root = tmp.path().display(),
    );
    parse_config(&toml).unwrap()
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(MockMastodon::populated(), "").await
    }

    pub async fn start_with(mastodon: MockMastodon, extra_config: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let embeddings = MockEmbeddings::default();
        let mastodon_url = spawn(mastodon.router()).await;
        let embed_url = spawn(embeddings.router()).await;

        let config = test_config(&tmp, &mastodon_url, &embed_url, extra_config);
        let pool = db::connect(&config).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();

        let social = MastodonClient::anonymous(&config.mastodon).unwrap();
        let embedder =
            HttpEmbedder::with_key(ApiKind::Basilica, &config.embedding, API_KEY.to_string())
                .unwrap();
        let ctx = AppContext::new(config, pool, Arc::new(social), Arc::new(embedder));

        Self {
            ctx,
            mastodon,
            embeddings,
            mastodon_url,
            _tmp: tmp,
        }
    }

    pub fn status_requests(&self) -> usize {
        self.mastodon.status_requests.load(Ordering::SeqCst)
    }

    pub fn texts_embedded(&self) -> usize {
        self.embeddings.texts_embedded.load(Ordering::SeqCst)
    }
}
