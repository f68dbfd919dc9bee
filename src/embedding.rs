//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and two concrete implementations:
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//! - **[`HttpEmbedder`]**: calls a remote sentence-embedding API, either the
//!   OpenAI `/v1/embeddings` endpoint or Basilica's `/embed/sentences/{model}`.
//!
//! Also provides the BLOB encoding used to store vectors in SQLite:
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`]: decode a BLOB back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{MastodoffError, Result};

/// A sentence-embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"twitter"`, `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed one batch of texts, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed any number of texts, splitting them into provider-sized batches.
pub async fn embed_all(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    tracing::info!("Getting embeddings for {} statuses...", texts.len());
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = embedder.embed(batch).await?;
        if embedded.len() != batch.len() {
            return Err(MastodoffError::Embedding(format!(
                "provider returned {} vectors for {} texts",
                embedded.len(),
                batch.len()
            )));
        }
        vectors.extend(embedded);
    }
    Ok(vectors)
}

/// Embed a single text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| MastodoffError::Embedding("Empty embedding response".to_string()))
}

// ============ Disabled Provider ============

/// Used when `embedding.provider = "disabled"`. Every call fails.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(MastodoffError::Config(
            "embedding provider is disabled; set [embedding].provider".to_string(),
        ))
    }
}

// ============ HTTP Providers ============

/// Remote API flavour spoken by [`HttpEmbedder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKind {
    /// `POST /v1/embeddings` with a bearer token.
    OpenAI,
    /// `POST /embed/sentences/{model}` with HTTP basic auth (key as username).
    Basilica,
}

impl ApiKind {
    fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com",
            Self::Basilica => "https://api.basilica.ai",
        }
    }
}

/// Embedding provider backed by a remote HTTP API.
pub struct HttpEmbedder {
    kind: ApiKind,
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpEmbedder {
    /// Build a provider, reading the API key from the configured environment variable.
    pub fn new(kind: ApiKind, config: &EmbeddingConfig) -> Result<Self> {
        let var = config.key_env();
        let api_key = std::env::var(&var)
            .map_err(|_| MastodoffError::Config(format!("{} environment variable not set", var)))?;
        Self::with_key(kind, config, api_key)
    }

    /// Build a provider with an explicit API key.
    pub fn with_key(kind: ApiKind, config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| MastodoffError::Config("embedding.model required".to_string()))?;
        let dims = config
            .dims
            .ok_or_else(|| MastodoffError::Config("embedding.dims required".to_string()))?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| kind.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MastodoffError::Embedding(e.to_string()))?;

        Ok(Self {
            kind,
            model,
            dims,
            base_url,
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }

    fn request(&self, texts: &[String]) -> reqwest::RequestBuilder {
        match self.kind {
            ApiKind::OpenAI => self
                .client
                .post(format!("{}/v1/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({
                    "model": self.model,
                    "input": texts,
                })),
            ApiKind::Basilica => self
                .client
                .post(format!("{}/embed/sentences/{}", self.base_url, self.model))
                .basic_auth(&self.api_key, Some(""))
                .json(&serde_json::json!({
                    "data": texts,
                    "opts": {},
                })),
        }
    }

    fn parse(&self, json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
        let vectors = match self.kind {
            ApiKind::OpenAI => parse_openai_response(json)?,
            ApiKind::Basilica => parse_basilica_response(json)?,
        };
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(MastodoffError::Embedding(format!(
                "expected {}-dimensional vectors from model {}, got {}",
                self.dims,
                self.model,
                bad.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(attempt, ?delay, "Retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            match self.request(texts).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| MastodoffError::Embedding(e.to_string()))?;
                        return self.parse(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = MastodoffError::Embedding(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    ));

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(MastodoffError::Embedding(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| MastodoffError::Embedding("Embedding failed after retries".into())))
    }
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| invalid("missing embedding"))?;
        indexed.push((index, json_to_vec(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Extract `embeddings[]`.
fn parse_basilica_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| invalid("missing embeddings array"))?
        .iter()
        .map(json_to_vec)
        .collect()
}

fn json_to_vec(value: &serde_json::Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| invalid("embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| invalid("embedding contains a non-number"))
        })
        .collect()
}

fn invalid(what: &str) -> MastodoffError {
    MastodoffError::Embedding(format!("Invalid embedding response: {}", what))
}

/// Create the [`Embedder`] selected by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`HttpEmbedder`] with [`ApiKind::OpenAI`] |
/// | `"basilica"` | [`HttpEmbedder`] with [`ApiKind::Basilica`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(HttpEmbedder::new(ApiKind::OpenAI, config)?)),
        "basilica" => Ok(Arc::new(HttpEmbedder::new(ApiKind::Basilica, config)?)),
        other => Err(MastodoffError::Config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use mastodoff::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blob_ignores_trailing_bytes() {
        let mut blob = vec_to_blob(&[0.5, -1.0]);
        blob.push(0xff);
        assert_eq!(blob_to_vec(&blob), vec![0.5, -1.0]);
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_basilica() {
        let json = json!({"embeddings": [[0.25, 0.5], [1.0, -1.0]]});
        let vectors = parse_basilica_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![1.0, -1.0]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_openai_response(&json!({"object": "list"})).is_err());
        assert!(parse_basilica_response(&json!({"embeddings": [["a"]]})).is_err());
    }

    #[test]
    fn test_dimension_check() {
        let config = EmbeddingConfig {
            provider: "basilica".into(),
            model: Some("twitter".into()),
            dims: Some(3),
            ..Default::default()
        };
        let embedder = HttpEmbedder::with_key(ApiKind::Basilica, &config, "key".into()).unwrap();
        let err = embedder
            .parse(&json!({"embeddings": [[1.0, 2.0]]}))
            .unwrap_err();
        assert!(err.to_string().contains("3-dimensional"));
    }

    #[tokio::test]
    async fn test_disabled_embedder_fails() {
        let err = embed_one(&DisabledEmbedder, "hello").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    struct CountingEmbedder;

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![texts.len() as f32]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_all_batches() {
        let texts: Vec<String> = (0..5).map(|i| format!("status {i}")).collect();
        let vectors = embed_all(&CountingEmbedder, &texts, 2).await.unwrap();
        // Batches of 2, 2, 1
        assert_eq!(
            vectors,
            vec![vec![2.0], vec![2.0], vec![2.0], vec![2.0], vec![1.0]]
        );
    }
}
