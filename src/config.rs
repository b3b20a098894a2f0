use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub registrar: RegistrarConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub db_location: PathBuf,
    pub collection_name: String,
    #[serde(default)]
    pub persist: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistrarConfig {
    pub host: String,
    pub port: u16,
    pub service: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Skip registrar records whose id is already indexed.
    #[serde(default = "default_skip_existing")]
    pub skip_existing: bool,
}

fn default_method() -> String {
    "GET".to_string()
}
fn default_skip_existing() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactsConfig {
    #[serde(default = "default_proxy_host")]
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            host: default_proxy_host(),
            port: default_proxy_port(),
        }
    }
}

fn default_proxy_host() -> String {
    "osc-dm-proxy-srv".to_string()
}
fn default_proxy_port() -> u16 {
    8000
}

/// Largest request body the API reads, matching axum's default limit.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_load_interval")]
    pub load_interval_seconds: u64,
    /// Request bodies above this size are rejected with `413`.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            load_interval_seconds: default_load_interval(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_load_interval() -> u64 {
    60
}
fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Embedding provider settings.
///
/// `openai` is the production provider. `hashed` needs no network or API key
/// and is meant for tests and offline runs.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.database.collection_name.trim().is_empty() {
        anyhow::bail!("database.collection_name must not be empty");
    }

    if config.server.load_interval_seconds == 0 {
        anyhow::bail!("server.load_interval_seconds must be > 0");
    }

    if config.server.max_body_bytes == 0 {
        anyhow::bail!("server.max_body_bytes must be > 0");
    }

    match config.registrar.method.to_ascii_uppercase().as_str() {
        "GET" | "POST" => {}
        other => anyhow::bail!(
            "Unsupported registrar.method: '{}'. Must be GET or POST.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "hashed" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hashed or openai.",
            other
        ),
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.logging.format.as_str() {
        "pretty" | "json" => {}
        other => anyhow::bail!("Unknown logging.format: '{}'. Must be pretty or json.", other),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[database]
db_location = "./data"
collection_name = "dataproducts"

[registrar]
host = "localhost"
port = 8000
service = "/api/registrar/dataproducts"
"#;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert!(!cfg.database.persist);
        assert_eq!(cfg.registrar.method, "GET");
        assert!(cfg.registrar.skip_existing);
        assert_eq!(cfg.server.load_interval_seconds, 60);
        assert_eq!(cfg.server.max_body_bytes, 2 * 1024 * 1024);
        assert_eq!(cfg.embedding.provider, "openai");
        assert_eq!(cfg.embedding.model, "text-embedding-ada-002");
        assert_eq!(cfg.embedding.dims, 1536);
        assert_eq!(cfg.artifacts.host, "osc-dm-proxy-srv");
        assert_eq!(cfg.logging.format, "pretty");
    }

    #[test]
    fn test_rejects_zero_interval() {
        let content = format!("{}\n[server]\nload_interval_seconds = 0\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("load_interval_seconds"));
    }

    #[test]
    fn test_rejects_zero_body_limit() {
        let content = format!("{}\n[server]\nmax_body_bytes = 0\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("max_body_bytes"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let content = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_rejects_unknown_method() {
        let content = MINIMAL.replace(
            "service = \"/api/registrar/dataproducts\"",
            "service = \"/x\"\nmethod = \"DELETE\"",
        );
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/dm-search.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
