//! Configuration management for ScriptRag
//!
//! Loads the TOML configuration, applies profile and environment overrides,
//! and validates the result before anything is constructed from it.

use crate::error::{Result, ScriptRagError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub synthesis: SynthesisConfig,
    pub resilience: ResilienceConfig,
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// Extracted `{title, text}` documents waiting to be ingested
    pub fn extracted_dir(&self) -> PathBuf {
        self.data_dir.join("extracted")
    }

    /// Chunk store directory, one JSON file per document
    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// SQLite file holding the vector index
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index").join("vectors.sqlite")
    }

    /// Append-only query log
    pub fn query_log_path(&self) -> PathBuf {
        self.data_dir.join("logs").join("query_logs.jsonl")
    }
}

/// Token window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub encoding: String,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub mode: String, // "offline" or "online"
    pub model: String,
    pub api_key_env: String,
    pub batch_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_prefix: Option<String>,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub collection: String,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: usize,
}

/// Answer synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub context_token_budget: usize,
    pub fallback_answer: String,
}

/// Timeouts and retries for external provider calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// HTTP service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub query_log: bool,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub purge_stale_chunks: bool,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ScriptRagError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ScriptRagError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ScriptRagError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self.profiles.get(profile).cloned().ok_or_else(|| {
            ScriptRagError::Config(format!("Unknown profile: {}", profile))
        })?;

        if let Some(mode) = overrides.embedding_mode {
            self.embedding.mode = mode;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: SCRIPTRAG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("SCRIPTRAG_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "EMBEDDING__MODE" => {
                self.embedding.mode = value.to_string();
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "LLM__PROVIDER" => {
                self.llm.provider = value.to_string();
            }
            "LLM__MODEL" => {
                self.llm.model = value.to_string();
            }
            "RETRIEVAL__TOP_K" => {
                self.retrieval.top_k = parse_env(path, value)?;
            }
            "SYNTHESIS__CONTEXT_TOKEN_BUDGET" => {
                self.synthesis.context_token_budget = parse_env(path, value)?;
            }
            "RESILIENCE__TIMEOUT_SECS" => {
                self.resilience.timeout_secs = parse_env(path, value)?;
            }
            "RESILIENCE__MAX_RETRIES" => {
                self.resilience.max_retries = parse_env(path, value)?;
            }
            "SERVER__BIND" => {
                self.server.bind = value.to_string();
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ScriptRagError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("scriptrag").join("config.toml"))
    }

    /// Copy of this configuration with `~/` expanded in the data directory
    pub fn resolved(&self) -> Result<Self> {
        let mut config = self.clone();
        config.storage.data_dir = expand_path(&self.storage.data_dir)?;
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| ScriptRagError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ScriptRagError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| ScriptRagError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.scriptrag"),
            },
            chunking: ChunkingConfig {
                chunk_size: crate::chunking::CHUNK_SIZE,
                overlap: crate::chunking::OVERLAP,
                encoding: "cl100k_base".to_string(),
            },
            embedding: EmbeddingConfig {
                mode: "offline".to_string(),
                model: "bge-small-en-v1.5".to_string(),
                api_key_env: "GEMINI_API_KEY".to_string(),
                batch_size: 32,
                query_prefix: None,
                document_prefix: None,
            },
            indexing: IndexingConfig {
                collection: "movie_scripts".to_string(),
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
            },
            retrieval: RetrievalConfig {
                top_k: crate::retrieval::DEFAULT_TOP_K,
            },
            llm: LlmConfig {
                provider: "gemini".to_string(),
                model: "gemini-1.5-pro".to_string(),
                api_key_env: "GEMINI_API_KEY".to_string(),
                base_url: None,
                temperature: 0.2,
                max_output_tokens: 1024,
            },
            synthesis: SynthesisConfig {
                context_token_budget: 6000,
                fallback_answer: crate::synthesis::FALLBACK_ANSWER.to_string(),
            },
            resilience: ResilienceConfig {
                timeout_secs: 60,
                max_retries: 3,
                initial_backoff_ms: 500,
                max_backoff_ms: 8000,
            },
            server: ServerConfig {
                bind: "127.0.0.1:8000".to_string(),
                query_log: true,
            },
            ingest: IngestConfig {
                purge_stale_chunks: true,
            },
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.top_k = 5;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retrieval.top_k, 5);
        assert_eq!(loaded.chunking.chunk_size, 512);
        assert_eq!(loaded.chunking.overlap, 256);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/scriptrag.toml"));
        assert!(matches!(result, Err(ScriptRagError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "cloud".to_string(),
            ProfileOverrides {
                embedding_mode: Some("online".to_string()),
                embedding_model: Some("models/embedding-001".to_string()),
                top_k: Some(6),
                ..Default::default()
            },
        );

        config.apply_profile("cloud").unwrap();
        assert_eq!(config.embedding.mode, "online");
        assert_eq!(config.embedding.model, "models/embedding-001");
        assert_eq!(config.retrieval.top_k, 6);

        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_env_value_parsing() {
        let mut config = Config::default();
        config.set_value_from_env("RETRIEVAL__TOP_K", "7").unwrap();
        config.set_value_from_env("LLM__MODEL", "gemini-1.5-flash").unwrap();
        assert_eq!(config.retrieval.top_k, 7);
        assert_eq!(config.llm.model, "gemini-1.5-flash");

        assert!(config.set_value_from_env("RETRIEVAL__TOP_K", "many").is_err());
        assert!(config.set_value_from_env("UNKNOWN__KEY", "x").is_ok());
    }

    #[test]
    fn test_derived_paths() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::from("/data");
        assert_eq!(config.storage.processed_dir(), PathBuf::from("/data/processed"));
        assert_eq!(
            config.storage.index_path(),
            PathBuf::from("/data/index/vectors.sqlite")
        );
    }

    #[test]
    fn test_expand_path_passthrough() {
        let path = expand_path(Path::new("/tmp/scriptrag")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/scriptrag"));
    }
}
