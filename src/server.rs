//! HTTP server.
//!
//! Serves the HTML interface over the library operations.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Forms and the list of stored accounts |
//! | `GET` | `/about` | About page |
//! | `GET`/`POST` | `/add` | Add or refresh `username` (optional `count`) |
//! | `GET` | `/get` | Stored statuses for `username` |
//! | `GET`/`POST` | `/predict` | Who of `username1`/`username2` wrote `content` |
//! | `GET` | `/reset` | Confirmation form |
//! | `POST` | `/reset` | Drop and recreate all tables |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! `GET` routes read their parameters from the query string and `POST`
//! routes from an urlencoded form body.
//!
//! # Error Contract
//!
//! Failures render an HTML error page. The status code follows the error:
//! unknown account `404`, bad parameters `400`, Mastodon rate limit `429`,
//! untrainable data `422`, upstream API failures `502`, embeddings not
//! configured `503`, anything else `500`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::error::{ApiError, DatabaseError, MastodoffError};
use crate::html;
use crate::ingest::add_account;
use crate::lookup::get_db_account_with_statuses;
use crate::migrate::reset_database;
use crate::predict::predict_account;
use crate::store;

/// Build the router. Split out from [`run_server`] so tests can serve it on
/// an ephemeral port.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/about", get(handle_about))
        .route("/add", get(handle_add_query).post(handle_add_form))
        .route("/get", get(handle_get))
        .route("/predict", get(handle_predict_query).post(handle_predict_form))
        .route("/reset", get(handle_reset_confirm).post(handle_reset))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

// ============ Error response ============

/// A [`MastodoffError`] rendered as an HTML page.
pub struct PageError(pub MastodoffError);

impl From<MastodoffError> for PageError {
    fn from(err: MastodoffError) -> Self {
        Self(err)
    }
}

/// HTTP status for an error shown to the user.
pub fn status_for(err: &MastodoffError) -> StatusCode {
    match err {
        MastodoffError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        MastodoffError::Api(ApiError::NoSearchResults { .. })
        | MastodoffError::Database(DatabaseError::NotInDatabase { .. }) => StatusCode::NOT_FOUND,
        MastodoffError::Api(ApiError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
        MastodoffError::Api(_) | MastodoffError::Embedding(_) => StatusCode::BAD_GATEWAY,
        MastodoffError::Classifier(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MastodoffError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        MastodoffError::Database(DatabaseError::Sqlx(_)) | MastodoffError::Io { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::warn!(error = %self.0, "Request rejected");
        }
        (status, Html(html::error(&self.0.to_string()))).into_response()
    }
}

type PageResult = Result<Html<String>, PageError>;

// ============ Parameters ============

/// Parameters for `/add`. `count` stays a string so an empty form field
/// means "not given" instead of a parse failure.
#[derive(Debug, Deserialize)]
pub struct AddParams {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub count: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetParams {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PredictParams {
    #[serde(default, alias = "user1")]
    pub username1: Option<String>,
    #[serde(default, alias = "user2")]
    pub username2: Option<String>,
    #[serde(default, alias = "text")]
    pub content: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, MastodoffError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(MastodoffError::InvalidInput(format!("{} is required", name))),
    }
}

fn parse_count(value: &Option<String>) -> Result<Option<usize>, MastodoffError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v.parse::<usize>().map(Some).map_err(|_| {
            MastodoffError::InvalidInput(format!("count must be a positive integer, got '{}'", v))
        }),
    }
}

// ============ Handlers ============

async fn handle_index(State(ctx): State<AppContext>) -> PageResult {
    let accounts = store::list_accounts(&ctx.pool).await?;
    Ok(Html(html::index(&accounts)))
}

async fn handle_about() -> Html<String> {
    Html(html::about())
}

async fn handle_add_query(
    State(ctx): State<AppContext>,
    Query(params): Query<AddParams>,
) -> PageResult {
    add(&ctx, &params).await
}

async fn handle_add_form(State(ctx): State<AppContext>, Form(params): Form<AddParams>) -> PageResult {
    add(&ctx, &params).await
}

async fn add(ctx: &AppContext, params: &AddParams) -> PageResult {
    let username = required(&params.username, "username")?;
    let count = parse_count(&params.count)?;
    let report = add_account(ctx, username, count).await?;
    Ok(Html(html::added(&report)))
}

async fn handle_get(State(ctx): State<AppContext>, Query(params): Query<GetParams>) -> PageResult {
    let username = required(&params.username, "username")?;
    let (account, statuses) = get_db_account_with_statuses(&ctx, username).await?;
    Ok(Html(html::account(&account, &statuses)))
}

async fn handle_predict_query(
    State(ctx): State<AppContext>,
    Query(params): Query<PredictParams>,
) -> PageResult {
    predict(&ctx, &params).await
}

async fn handle_predict_form(
    State(ctx): State<AppContext>,
    Form(params): Form<PredictParams>,
) -> PageResult {
    predict(&ctx, &params).await
}

async fn predict(ctx: &AppContext, params: &PredictParams) -> PageResult {
    let username1 = required(&params.username1, "username1")?;
    let username2 = required(&params.username2, "username2")?;
    let content = required(&params.content, "content")?;
    let prediction = predict_account(ctx, username1, username2, content).await?;
    Ok(Html(html::prediction(&prediction, content)))
}

async fn handle_reset_confirm() -> Html<String> {
    Html(html::reset_confirm())
}

async fn handle_reset(State(ctx): State<AppContext>) -> PageResult {
    reset_database(&ctx.pool).await?;
    Ok(Html(html::reset_done()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
