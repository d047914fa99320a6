/// Embedding provider trait and FastEmbed implementation
use super::EmbedMode;
use crate::error::{Result, ScriptRagError};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;

/// Trait for embedding providers
///
/// Allows abstraction over different embedding backends (FastEmbed, Gemini, etc.)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batched for efficiency)
    async fn embed_batch(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text, mode).await?);
        }
        Ok(embeddings)
    }

    /// Get the embedding dimension, when known before the first call
    fn dimension(&self) -> Option<usize>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// FastEmbed provider for local embedding generation
///
/// Query/document asymmetry is expressed through text prefixes, following
/// each model family's published usage (BGE instructs queries only, Nomic
/// tags both sides, MiniLM is symmetric).
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
    query_prefix: String,
    document_prefix: String,
}

const BGE_QUERY_INSTRUCTION: &str = "Represent this sentence for searching relevant passages: ";

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// **Important**: Models are downloaded on-demand to `~/.cache/huggingface/`
    /// on first use.
    /// - all-MiniLM-L6-v2: 90MB (384 dims)
    /// - bge-small-en-v1.5: 130MB (384 dims) - default
    /// - bge-base-en-v1.5: 440MB (768 dims)
    /// - nomic-embed-text-v1.5: 520MB (768 dims)
    pub fn new(
        model_name: &str,
        query_prefix: Option<String>,
        document_prefix: Option<String>,
    ) -> Result<Self> {
        let (embedding_model, dimension, model_size_mb, default_query, default_document) =
            match model_name {
                "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => {
                    (EmbeddingModel::AllMiniLML6V2, 384, 90, "", "")
                }
                "bge-small-en-v1.5" => (
                    EmbeddingModel::BGESmallENV15,
                    384,
                    130,
                    BGE_QUERY_INSTRUCTION,
                    "",
                ),
                "bge-base-en-v1.5" => (
                    EmbeddingModel::BGEBaseENV15,
                    768,
                    440,
                    BGE_QUERY_INSTRUCTION,
                    "",
                ),
                "nomic-embed-text-v1.5" => (
                    EmbeddingModel::NomicEmbedTextV15,
                    768,
                    520,
                    "search_query: ",
                    "search_document: ",
                ),
                _ => {
                    return Err(ScriptRagError::Config(format!(
                        "Unsupported embedding model: {}. Supported: all-MiniLM-L6-v2, \
                         bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
                        model_name
                    )));
                }
            };

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| ScriptRagError::permanent("fastembed", e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
            query_prefix: query_prefix.unwrap_or_else(|| default_query.to_string()),
            document_prefix: document_prefix.unwrap_or_else(|| default_document.to_string()),
        })
    }

    /// Create provider with default model (bge-small-en-v1.5)
    pub fn with_default_model() -> Result<Self> {
        Self::new("bge-small-en-v1.5", None, None)
    }

    fn prepare(&self, text: &str, mode: EmbedMode) -> String {
        let prefix = match mode {
            EmbedMode::Query => &self.query_prefix,
            EmbedMode::Document => &self.document_prefix,
        };
        format!("{}{}", prefix, text)
    }

    async fn run_model(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let embeddings = tokio::task::spawn_blocking(move || model.embed(inputs, None))
            .await
            .map_err(|e| ScriptRagError::Other(e.into()))?
            .map_err(|e| ScriptRagError::permanent("fastembed", e.to_string()))?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(ScriptRagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(ScriptRagError::permanent("fastembed", "Empty text"));
        }

        self.run_model(vec![self.prepare(text, mode)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ScriptRagError::permanent("fastembed", "No embeddings generated"))
    }

    async fn embed_batch(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.iter().any(|t| t.is_empty()) {
            return Err(ScriptRagError::permanent(
                "fastembed",
                "Batch contains empty text",
            ));
        }

        let inputs = texts.iter().map(|t| self.prepare(t, mode)).collect();
        self.run_model(inputs).await
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
