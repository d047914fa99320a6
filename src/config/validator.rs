use crate::config::Config;
use crate::error::{Result, ScriptRagError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_synthesis(config, &mut errors);
        Self::validate_resilience(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScriptRagError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;
        if chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        // A zero stride would never advance the window
        if chunking.overlap >= chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.overlap",
                format!(
                    "Overlap ({}) must be smaller than chunk size ({})",
                    chunking.overlap, chunking.chunk_size
                ),
            ));
        }

        let valid_encodings = ["cl100k_base", "o200k_base", "p50k_base"];
        if !valid_encodings.contains(&chunking.encoding.as_str()) {
            errors.push(ValidationError::new(
                "chunking.encoding",
                format!(
                    "Encoding must be one of {:?}, got '{}'",
                    valid_encodings, chunking.encoding
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let mode = &config.embedding.mode;
        if mode != "offline" && mode != "online" {
            errors.push(ValidationError::new(
                "embedding.mode",
                format!("Mode must be 'offline' or 'online', got '{}'", mode),
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if mode == "online" && config.embedding.api_key_env.is_empty() {
            errors.push(ValidationError::new(
                "embedding.api_key_env",
                "Online embedding requires an API key environment variable",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.collection.is_empty() {
            errors.push(ValidationError::new(
                "indexing.collection",
                "Collection name cannot be empty",
            ));
        }

        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be a positive integer",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        // API key presence is checked when the generator is built, so that
        // ingestion and search work without generation credentials.
        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["gemini", "openai"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if config.llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        if config.llm.max_output_tokens == 0 {
            errors.push(ValidationError::new(
                "llm.max_output_tokens",
                "max_output_tokens must be greater than 0",
            ));
        }
    }

    fn validate_synthesis(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.synthesis.context_token_budget == 0 {
            errors.push(ValidationError::new(
                "synthesis.context_token_budget",
                "Context token budget must be greater than 0",
            ));
        }

        if config.synthesis.fallback_answer.trim().is_empty() {
            errors.push(ValidationError::new(
                "synthesis.fallback_answer",
                "Fallback answer cannot be empty",
            ));
        }
    }

    fn validate_resilience(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.resilience.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "resilience.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }

        if config.resilience.initial_backoff_ms > config.resilience.max_backoff_ms {
            errors.push(ValidationError::new(
                "resilience.initial_backoff_ms",
                "Initial backoff cannot exceed max backoff",
            ));
        }
    }
}
