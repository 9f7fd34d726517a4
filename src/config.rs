use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MnemoConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub rerank: RerankConfig,
    pub retrieval: RetrievalConfig,
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `agent_memories.json`, `memory_metadata.json`, and `faiss_index.bin`.
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"local"` (ONNX Runtime) or `"remote"` (HTTP embedding API).
    pub provider: String,
    /// Local ONNX model name.
    pub model: String,
    pub cache_dir: String,
    /// Remote API model name.
    pub remote_model: String,
    /// Remote only. Falls back to `MNEMO_EMBEDDING_API_KEY` / `GEMINI_API_KEY`.
    pub api_key: Option<String>,
    pub api_base: String,
    /// Remote only. The local model is fixed at 384.
    pub dimensions: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub initial_k: usize,
    pub final_k: usize,
    /// Only candidates from this source are reranked and returned as answers.
    pub quality_source: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestionConfig {
    pub chunk_size: usize,
    pub min_chunk_len: usize,
    pub filter_short: bool,
    pub max_chunk_bytes: usize,
    pub deduplicate: bool,
    pub default_source: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "extract".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_mnemo_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            remote_model: "text-embedding-004".into(),
            api_key: None,
            api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            dimensions: 768,
            timeout_secs: 30,
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        let cache_dir = default_mnemo_dir()
            .join("models")
            .join("reranker")
            .to_string_lossy()
            .into_owned();
        Self {
            enabled: true,
            model: "ms-marco-MiniLM-L-6-v2".into(),
            cache_dir,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            initial_k: 20,
            final_k: 3,
            quality_source: "agent_response".into(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            min_chunk_len: 50,
            filter_short: true,
            max_chunk_bytes: 30_000,
            deduplicate: false,
            default_source: "file_upload".into(),
        }
    }
}

/// Returns `~/.mnemo/`
pub fn default_mnemo_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mnemo")
}

/// Returns the default config file path: `~/.mnemo/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mnemo_dir().join("config.toml")
}

impl MnemoConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
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
            MnemoConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (MNEMO_DATA_DIR, MNEMO_LOG_LEVEL, MNEMO_EMBEDDING_PROVIDER, MNEMO_EMBEDDING_API_KEY).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEMO_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("MNEMO_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MNEMO_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("MNEMO_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(val);
        }
    }

    /// Resolve the data directory, expanding `~` if needed.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MnemoConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.storage.data_dir, "extract");
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.retrieval.initial_k, 20);
        assert_eq!(config.retrieval.final_k, 3);
        assert_eq!(config.retrieval.quality_source, "agent_response");
        assert_eq!(config.ingestion.chunk_size, 1000);
        assert_eq!(config.ingestion.min_chunk_len, 50);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
data_dir = "/tmp/mnemo-data"

[embedding]
provider = "remote"
dimensions = 768

[retrieval]
final_k = 5
"#;
        let config: MnemoConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.data_dir, "/tmp/mnemo-data");
        assert_eq!(config.embedding.provider, "remote");
        assert_eq!(config.retrieval.final_k, 5);
        // defaults still apply for unset fields
        assert_eq!(config.retrieval.initial_k, 20);
        assert_eq!(config.embedding.model, "all-MiniLM-L6-v2");
        assert!(config.rerank.enabled);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MnemoConfig::default();
        std::env::set_var("MNEMO_DATA_DIR", "/tmp/override");
        std::env::set_var("MNEMO_LOG_LEVEL", "trace");
        std::env::set_var("MNEMO_EMBEDDING_API_KEY", "secret");

        config.apply_env_overrides();

        assert_eq!(config.storage.data_dir, "/tmp/override");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.embedding.api_key.as_deref(), Some("secret"));

        // Clean up
        std::env::remove_var("MNEMO_DATA_DIR");
        std::env::remove_var("MNEMO_LOG_LEVEL");
        std::env::remove_var("MNEMO_EMBEDDING_API_KEY");
    }

    #[test]
    fn expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("extract"), PathBuf::from("extract"));
        assert_eq!(expand_tilde("/abs/dir"), PathBuf::from("/abs/dir"));
    }
}
