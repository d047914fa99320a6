use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for ScriptRag
#[derive(Error, Debug)]
pub enum ScriptRagError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No query text was supplied
    #[error("No query provided")]
    EmptyQuery,

    /// top_k must be a positive integer
    #[error("top_k must be greater than 0, got {0}")]
    InvalidTopK(usize),

    /// Tokenizer could not encode or decode text
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Embedding or generation provider failed
    #[error("{provider} {kind} error: {message}")]
    Provider {
        provider: String,
        kind: ProviderErrorKind,
        message: String,
    },

    /// An external call exceeded its time budget
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Vector store unreachable or uninitialized
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// Vector does not match the dimension of the index
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The collection holds vectors from a different embedding model
    #[error(
        "Index was built with embedding model '{indexed}' but '{configured}' is configured; \
         re-run ingestion with --force to rebuild it"
    )]
    EmbeddingModelChanged { indexed: String, configured: String },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Whether a provider failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Rate limits, server errors, dropped connections
    Transient,
    /// Bad credentials, invalid requests, unknown models
    Permanent,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderErrorKind::Transient => write!(f, "transient"),
            ProviderErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

impl ScriptRagError {
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            kind: ProviderErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            kind: ProviderErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// True for failures a bounded retry may recover from
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScriptRagError::Provider {
                kind: ProviderErrorKind::Transient,
                ..
            } | ScriptRagError::Timeout { .. }
        )
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for ScriptRag operations
pub type Result<T> = std::result::Result<T, ScriptRagError>;
