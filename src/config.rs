use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    pub mastodon: MastodonConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MastodonConfig {
    /// Instance base URL, e.g. `https://mastodon.social`.
    pub api_base_url: String,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default)]
    pub website: Option<String>,
    /// Where the registered app's client id/secret are stored.
    #[serde(default = "default_secret_file")]
    pub secret_file: PathBuf,
    /// Where the OAuth access token is stored.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    /// Login name for the password grant. Without it the client stays anonymous.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_password_env")]
    pub password_env: String,
    /// Statuses requested per page. Mastodon caps this at 40.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Send the access token when listing statuses. Anonymous requests get
    /// a separate, usually larger, rate-limit bucket.
    #[serde(default)]
    pub authenticated_statuses: bool,
}

fn default_client_name() -> String {
    "mastodoff".to_string()
}
fn default_secret_file() -> PathBuf {
    PathBuf::from("./data/mastodon_client.json")
}
fn default_token_file() -> PathBuf {
    PathBuf::from("./data/mastodon_token.json")
}
fn default_password_env() -> String {
    "MASTODON_PASSWORD".to_string()
}
fn default_page_limit() -> u32 {
    40
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Override the provider's base URL (self-hosted gateways, tests).
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key. Defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            api_key_env: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Name of the environment variable the API key is read from.
    pub fn key_env(&self) -> String {
        if let Some(ref var) = self.api_key_env {
            return var.clone();
        }
        match self.provider.as_str() {
            "basilica" => "BASILICA_KEY".to_string(),
            _ => "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// Inverse regularisation strength; smaller means stronger L2 penalty.
    #[serde(default = "default_c")]
    pub c: f64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default = "default_tol")]
    pub tol: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            c: default_c(),
            max_iter: default_max_iter(),
            tol: default_tol(),
        }
    }
}

fn default_c() -> f64 {
    1.0
}
fn default_max_iter() -> usize {
    1000
}
fn default_tol() -> f64 {
    1e-4
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestConfig {
    /// Statuses fetched per account when the request does not say. `None` fetches all.
    #[serde(default)]
    pub default_count: Option<usize>,
}

impl Config {
    /// Defaults for mastodon.social with embeddings disabled.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/mastodoff.sqlite"),
            },
            server: ServerConfig {
                bind: "127.0.0.1:5000".to_string(),
            },
            mastodon: MastodonConfig {
                api_base_url: "https://mastodon.social".to_string(),
                client_name: default_client_name(),
                website: None,
                secret_file: default_secret_file(),
                token_file: default_token_file(),
                username: None,
                password_env: default_password_env(),
                page_limit: default_page_limit(),
                timeout_secs: default_timeout_secs(),
                authenticated_statuses: false,
            },
            embedding: EmbeddingConfig::default(),
            classifier: ClassifierConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate mastodon
    if !config.mastodon.api_base_url.starts_with("http://")
        && !config.mastodon.api_base_url.starts_with("https://")
    {
        anyhow::bail!("mastodon.api_base_url must start with http:// or https://");
    }
    if config.mastodon.page_limit == 0 || config.mastodon.page_limit > 40 {
        anyhow::bail!("mastodon.page_limit must be between 1 and 40");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "basilica" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or basilica.",
            other
        ),
    }

    // Validate classifier
    if config.classifier.c <= 0.0 || !config.classifier.c.is_finite() {
        anyhow::bail!("classifier.c must be a positive number");
    }
    if config.classifier.max_iter == 0 {
        anyhow::bail!("classifier.max_iter must be > 0");
    }
    if config.classifier.tol <= 0.0 {
        anyhow::bail!("classifier.tol must be > 0");
    }

    if config.ingest.default_count == Some(0) {
        anyhow::bail!("ingest.default_count must be > 0 when set");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[db]
path = "./data/test.sqlite"

[server]
bind = "127.0.0.1:5000"

[mastodon]
api_base_url = "https://mastodon.example"
"#;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config = parse_config(BASE).unwrap();
        assert_eq!(config.mastodon.page_limit, 40);
        assert_eq!(config.mastodon.client_name, "mastodoff");
        assert_eq!(config.mastodon.password_env, "MASTODON_PASSWORD");
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.classifier.c, 1.0);
        assert!(config.ingest.default_count.is_none());
    }

    #[test]
    fn test_enabled_provider_requires_model_and_dims() {
        let toml = format!("{BASE}\n[embedding]\nprovider = \"openai\"\ndims = 1536\n");
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("embedding.model"));

        let toml = format!("{BASE}\n[embedding]\nprovider = \"basilica\"\nmodel = \"twitter\"\n");
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let toml = format!(
            "{BASE}\n[embedding]\nprovider = \"word2vec\"\nmodel = \"x\"\ndims = 3\n"
        );
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_page_limit_bounds() {
        let toml = BASE.replace(
            "api_base_url = \"https://mastodon.example\"",
            "api_base_url = \"https://mastodon.example\"\npage_limit = 80",
        );
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn test_classifier_validation() {
        let toml = format!("{BASE}\n[classifier]\nc = 0.0\n");
        assert!(parse_config(&toml).is_err());

        let toml = format!("{BASE}\n[classifier]\nc = 0.5\nmax_iter = 200\n");
        let config = parse_config(&toml).unwrap();
        assert_eq!(config.classifier.max_iter, 200);
    }

    #[test]
    fn test_key_env_defaults_per_provider() {
        let mut embedding = EmbeddingConfig {
            provider: "basilica".to_string(),
            ..Default::default()
        };
        assert_eq!(embedding.key_env(), "BASILICA_KEY");

        embedding.provider = "openai".to_string();
        assert_eq!(embedding.key_env(), "OPENAI_API_KEY");

        embedding.api_key_env = Some("MY_KEY".to_string());
        assert_eq!(embedding.key_env(), "MY_KEY");
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = parse_config(include_str!("../config/mastodoff.toml")).unwrap();
        assert_eq!(config.embedding.provider, "basilica");
        assert_eq!(config.embedding.model.as_deref(), Some("twitter"));
        assert!(config.mastodon.username.is_none());
    }
}
