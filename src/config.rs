use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngramConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub vector: VectorConfig,
    pub embedding: EmbeddingConfig,
    pub curator: CuratorConfig,
    pub security: SecurityConfig,
    pub retrieval: RetrievalConfig,
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Per-request deadline in seconds; expired requests abort with Timeout.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorConfig {
    /// Embedding dimension D. Pinned in schema_meta on first startup.
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"ollama"` (remote HTTP) or `"static"` (deterministic, for tests/dev).
    pub provider: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CuratorConfig {
    /// `"openai"` (remote HTTP) or `"fallback"` (no LLM, conservative decisions).
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    /// Shared API secret. Required when `enable_auth` is true.
    pub api_secret_key: Option<String>,
    pub enable_auth: bool,
    pub admin_username: String,
    pub admin_password: Option<String>,
    pub max_requests_per_minute: u32,
    pub max_requests_per_hour: u32,
    /// How long an IP stays blocked after breaching the hourly limit.
    pub block_duration_secs: u64,
    /// Byte ceiling for annotation/comment-like text fields.
    pub max_annotation_bytes: usize,
    /// Byte ceiling for everything else (request bodies, memory text).
    pub max_content_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub default_similarity_threshold: f32,
    /// Candidate pool floor for KNN-with-filter; actual pool is max(4·top_k, this).
    pub candidate_pool_min: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub expiry_interval_secs: u64,
    pub consolidation_interval_secs: u64,
    pub decay_interval_secs: u64,
    /// Cosine similarity above which same-witness memories are merged.
    pub consolidation_threshold: f64,
    /// Decay constant for logarithmic importance decay (per day of age).
    pub decay_lambda: f64,
}

impl Default for EngramConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            vector: VectorConfig::default(),
            embedding: EmbeddingConfig::default(),
            curator: CuratorConfig::default(),
            security: SecurityConfig::default(),
            retrieval: RetrievalConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            log_level: "info".into(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "engram.db".into(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { dimensions: 1536 }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            base_url: "http://localhost:11434".into(),
            model: "nomic-embed-text:latest".into(),
        }
    }
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4.1-nano".into(),
            api_key: None,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_secret_key: None,
            enable_auth: true,
            admin_username: "admin".into(),
            admin_password: None,
            max_requests_per_minute: 60,
            max_requests_per_hour: 1000,
            block_duration_secs: 3600,
            max_annotation_bytes: 10_000,
            max_content_bytes: 1024 * 1024,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            default_similarity_threshold: 0.7,
            candidate_pool_min: 50,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry_interval_secs: 86_400,
            consolidation_interval_secs: 604_800,
            decay_interval_secs: 2_592_000,
            consolidation_threshold: 0.95,
            decay_lambda: 0.01,
        }
    }
}

impl EngramConfig {
    /// Load config from `engram.toml` (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from("engram.toml")
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EngramConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `ENGRAM_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ENGRAM_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("ENGRAM_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_DB_PATH") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_VECTOR_DIMENSIONS") {
            if let Ok(dims) = val.parse() {
                self.vector.dimensions = dims;
            }
        }
        if let Ok(val) = std::env::var("ENGRAM_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_EMBEDDING_URL") {
            self.embedding.base_url = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_EMBEDDING_MODEL") {
            self.embedding.model = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_CURATOR_MODEL") {
            self.curator.model = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_CURATOR_API_KEY") {
            self.curator.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("ENGRAM_API_SECRET_KEY") {
            self.security.api_secret_key = Some(val);
        }
        if let Ok(val) = std::env::var("ENGRAM_ENABLE_API_AUTH") {
            self.security.enable_auth = val == "true" || val == "1";
        }
        if let Ok(val) = std::env::var("ENGRAM_RATE_LIMIT_PER_MINUTE") {
            if let Ok(n) = val.parse() {
                self.security.max_requests_per_minute = n;
            }
        }
        if let Ok(val) = std::env::var("ENGRAM_RATE_LIMIT_PER_HOUR") {
            if let Ok(n) = val.parse() {
                self.security.max_requests_per_hour = n;
            }
        }
        if let Ok(val) = std::env::var("ENGRAM_ADMIN_USERNAME") {
            self.security.admin_username = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_ADMIN_PASSWORD") {
            self.security.admin_password = Some(val);
        }
        if let Ok(val) = std::env::var("ENGRAM_MAX_ANNOTATION_BYTES") {
            if let Ok(n) = val.parse() {
                self.security.max_annotation_bytes = n;
            }
        }
        if let Ok(val) = std::env::var("ENGRAM_CLEANUP_ENABLED") {
            self.cleanup.enabled = val == "true" || val == "1";
        }
        if let Ok(val) = std::env::var("ENGRAM_CLEANUP_EXPIRY_INTERVAL") {
            if let Ok(n) = val.parse() {
                self.cleanup.expiry_interval_secs = n;
            }
        }
    }

    /// Resolve the database path.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.db_path)
    }
}
