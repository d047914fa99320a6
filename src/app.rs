//! Explicit construction of every long-lived handle from configuration
//!
//! The index and its database are opened once here and passed by `Arc` to
//! whatever needs them. Providers are built on demand so that commands which
//! never embed or generate (stats, inspect) need no model or API key.

use crate::chunking::{BpeTokenizer, Chunker, ChunkingParams, Tokenizer};
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, FastEmbedProvider, GeminiEmbedder};
use crate::error::{Result, ScriptRagError};
use crate::generation::{GeminiGenerator, GenerationSettings, Generator, OpenAiGenerator};
use crate::pipeline::{ChunkingStage, Ingestor};
use crate::resilience::RetryPolicy;
use crate::retrieval::Retriever;
use crate::server::{AppState, QueryLog};
use crate::storage::{ChunkStore, Database, HnswParams, IngestLedger, VectorIndex};
use crate::synthesis::AnswerSynthesizer;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct AppContext {
    config: Config,
    tokenizer: Arc<dyn Tokenizer>,
    database: Database,
    index: Arc<VectorIndex>,
    retry: RetryPolicy,
}

impl AppContext {
    /// Open storage for a (path-resolved) configuration
    pub fn open(config: &Config) -> Result<Self> {
        let config = config.resolved()?;
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(BpeTokenizer::new(&config.chunking.encoding)?);

        let database = Database::new(&config.storage.index_path())?;
        let index = Arc::new(VectorIndex::new(
            database.clone(),
            config.indexing.collection.clone(),
            HnswParams {
                m: config.indexing.hnsw_m,
                ef_construction: config.indexing.hnsw_ef_construction,
                ef_search: config.indexing.hnsw_ef_search,
            },
        ));
        let retry = RetryPolicy::from_config(&config.resilience);

        info!(
            "Opened index '{}' at {}",
            config.indexing.collection,
            config.storage.index_path().display()
        );

        Ok(Self {
            config,
            tokenizer,
            database,
            index,
            retry,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    pub fn ledger(&self) -> IngestLedger {
        IngestLedger::new(self.database.clone(), self.config.indexing.collection.clone())
    }

    fn timeout(&self) -> Duration {
        self.retry.timeout()
    }

    /// Embedding provider selected by `embedding.mode`
    pub fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let embedding = &self.config.embedding;
        match embedding.mode.as_str() {
            "offline" => Ok(Arc::new(FastEmbedProvider::new(
                &embedding.model,
                embedding.query_prefix.clone(),
                embedding.document_prefix.clone(),
            )?)),
            "online" => {
                let key = api_key("gemini", &embedding.api_key_env)?;
                Ok(Arc::new(GeminiEmbedder::new(
                    &key,
                    &embedding.model,
                    self.timeout(),
                )?))
            }
            other => Err(ScriptRagError::InvalidConfigValue {
                path: "embedding.mode".to_string(),
                message: format!("Unknown embedding mode: {}", other),
            }),
        }
    }

    /// Generator selected by `llm.provider`
    pub fn generator(&self) -> Result<Arc<dyn Generator>> {
        let llm = &self.config.llm;
        let settings = GenerationSettings {
            temperature: llm.temperature,
            max_output_tokens: llm.max_output_tokens,
        };
        let key = api_key(&llm.provider, &llm.api_key_env)?;

        match llm.provider.as_str() {
            "gemini" => Ok(Arc::new(GeminiGenerator::new(
                &key,
                &llm.model,
                llm.base_url.as_deref(),
                settings,
                self.timeout(),
            )?)),
            "openai" => Ok(Arc::new(OpenAiGenerator::new(
                &key,
                &llm.model,
                llm.base_url.as_deref(),
                settings,
                self.timeout(),
            )?)),
            other => Err(ScriptRagError::InvalidConfigValue {
                path: "llm.provider".to_string(),
                message: format!("Unknown LLM provider: {}", other),
            }),
        }
    }

    pub fn chunk_store(&self) -> Result<ChunkStore> {
        ChunkStore::new(self.config.storage.processed_dir())
    }

    pub fn chunker(&self) -> Result<Chunker> {
        let params = ChunkingParams::new(self.config.chunking.chunk_size, self.config.chunking.overlap)?;
        Ok(Chunker::new(Arc::clone(&self.tokenizer), params))
    }

    /// Chunking without an embedder, for the `chunk` command
    pub fn chunking_stage(&self) -> Result<ChunkingStage> {
        Ok(ChunkingStage::new(self.chunker()?, self.chunk_store()?))
    }

    pub fn ingestor(&self, embedder: Arc<dyn EmbeddingProvider>) -> Result<Ingestor> {
        Ok(Ingestor::new(
            self.chunking_stage()?,
            embedder,
            Arc::clone(&self.index),
            self.ledger(),
            self.retry.clone(),
            self.config.embedding.batch_size,
            self.config.ingest.purge_stale_chunks,
        ))
    }

    pub fn retriever(&self, embedder: Arc<dyn EmbeddingProvider>) -> Retriever {
        Retriever::new(
            embedder,
            Arc::clone(&self.index),
            self.retry.clone(),
            self.config.retrieval.top_k,
        )
    }

    pub fn synthesizer(
        &self,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
    ) -> AnswerSynthesizer {
        AnswerSynthesizer::new(
            Arc::new(self.retriever(embedder)),
            generator,
            Arc::clone(&self.tokenizer),
            self.retry.clone(),
            &self.config.synthesis,
        )
    }

    /// Handler state for the HTTP service
    pub fn server_state(&self, synthesizer: AnswerSynthesizer) -> AppState {
        let query_log = self
            .config
            .server
            .query_log
            .then(|| Arc::new(QueryLog::new(self.config.storage.query_log_path())));

        AppState {
            synthesizer: Arc::new(synthesizer),
            index: Arc::clone(&self.index),
            query_log,
        }
    }
}

fn api_key(provider: &str, env_var: &str) -> Result<String> {
    std::env::var(env_var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ScriptRagError::permanent(provider, format!("{} is not set", env_var)))
}
