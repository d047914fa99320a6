//! Ingestion orchestrator
//!
//! Two stages, each resumable on its own:
//! 1. chunk: document text to token windows, persisted in the chunk store
//! 2. embed: stored chunks to document-mode vectors, upserted by chunk id
//!
//! Each stage is skipped for a document whose content hash has not changed
//! since it last ran, unless forced.

mod report;

pub use report::IngestReport;

use crate::chunking::Chunker;
use crate::documents::Document;
use crate::embedding::{EmbedMode, EmbeddingProvider};
use crate::error::{Result, ScriptRagError};
use crate::resilience::RetryPolicy;
use crate::storage::{
    ChunkMetadata, ChunkStore, ChunkedDocument, IndexRecord, IngestLedger, VectorIndex,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of the chunking stage for one document
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub document: ChunkedDocument,
    /// False when an up-to-date chunk file was reused
    pub rechunked: bool,
}

/// Outcome of the embedding stage for one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedOutcome {
    /// False when the ledger showed this version already embedded
    pub embedded: bool,
    pub chunks_upserted: usize,
    pub stale_ids: Vec<String>,
    pub stale_purged: usize,
}

/// Chunking stage: document text to token windows in the chunk store
pub struct ChunkingStage {
    chunker: Chunker,
    chunk_store: ChunkStore,
}

impl ChunkingStage {
    pub fn new(chunker: Chunker, chunk_store: ChunkStore) -> Self {
        Self {
            chunker,
            chunk_store,
        }
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.chunk_store
    }

    /// Hash of the text together with everything that shapes its chunks
    pub fn content_hash(&self, document: &Document) -> String {
        let params = self.chunker.params();
        let mut hasher = blake3::Hasher::new();
        hasher.update(document.text.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.chunker.tokenizer().name().as_bytes());
        hasher.update(&(params.chunk_size as u64).to_le_bytes());
        hasher.update(&(params.overlap as u64).to_le_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Chunk one document unless an up-to-date chunk file exists
    pub fn chunk_document(&self, document: &Document, force: bool) -> Result<ChunkOutcome> {
        let content_hash = self.content_hash(document);

        if !force {
            if let Some(existing) = self.chunk_store.load(&document.title)? {
                if existing.content_hash == content_hash {
                    debug!("Chunks for '{}' are up to date", document.title);
                    return Ok(ChunkOutcome {
                        document: existing,
                        rechunked: false,
                    });
                }
            }
        }

        let chunks = self.chunker.chunk(&document.text, &document.key())?;
        let chunked = ChunkedDocument {
            title: document.title.clone(),
            content_hash,
            chunks,
        };
        self.chunk_store.save(&chunked)?;

        info!(
            "Chunked '{}' into {} chunks",
            chunked.title,
            chunked.chunks.len()
        );

        Ok(ChunkOutcome {
            document: chunked,
            rechunked: true,
        })
    }

    /// Chunk every document, in order
    pub fn chunk_all(&self, documents: &[Document], force: bool) -> Result<IngestReport> {
        let start = Instant::now();
        let mut report = IngestReport::default();

        for document in documents {
            let chunked = self.chunk_document(document, force)?;
            report.record_chunking(&chunked);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!("{}", report);
        Ok(report)
    }
}

/// Full ingestion: chunking stage followed by embedding into the index
pub struct Ingestor {
    chunking: ChunkingStage,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    ledger: IngestLedger,
    retry: RetryPolicy,
    batch_size: usize,
    purge_stale_chunks: bool,
}

impl Ingestor {
    pub fn new(
        chunking: ChunkingStage,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        ledger: IngestLedger,
        retry: RetryPolicy,
        batch_size: usize,
        purge_stale_chunks: bool,
    ) -> Self {
        Self {
            chunking,
            embedder,
            index,
            ledger,
            retry,
            batch_size: batch_size.max(1),
            purge_stale_chunks,
        }
    }

    pub fn chunking(&self) -> &ChunkingStage {
        &self.chunking
    }

    pub fn ledger(&self) -> &IngestLedger {
        &self.ledger
    }

    /// Chunk one document (see [`ChunkingStage::chunk_document`])
    pub fn chunk_document(&self, document: &Document, force: bool) -> Result<ChunkOutcome> {
        self.chunking.chunk_document(document, force)
    }

    /// Embed and upsert one chunked document unless the ledger has it
    pub async fn embed_document(
        &self,
        document: &ChunkedDocument,
        force: bool,
    ) -> Result<EmbedOutcome> {
        self.check_embedding_model(force)?;

        if !force {
            if let Some(entry) = self.ledger.get(&document.title)? {
                if entry.content_hash == document.content_hash {
                    debug!("'{}' is already embedded", document.title);
                    return Ok(EmbedOutcome::default());
                }
            }
        }

        let start = Instant::now();
        let mut upserted = 0;

        for batch in document.chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let embedder = &self.embedder;
            let texts = texts.as_slice();
            let vectors = self
                .retry
                .run("document embedding", move || async move {
                    embedder.embed_batch(texts, EmbedMode::Document).await
                })
                .await?;

            if vectors.len() != batch.len() {
                return Err(ScriptRagError::permanent(
                    self.embedder.model_name(),
                    format!(
                        "Embedding count mismatch: expected {}, got {}",
                        batch.len(),
                        vectors.len()
                    ),
                ));
            }

            let records: Vec<IndexRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexRecord {
                    id: chunk.chunk_id.clone(),
                    vector,
                    document: chunk.text.clone(),
                    metadata: ChunkMetadata {
                        title: document.title.clone(),
                        chunk_id: chunk.chunk_id.clone(),
                    },
                })
                .collect();

            self.index.upsert_batch(&records)?;
            upserted += records.len();
        }

        let current: HashSet<&str> = document
            .chunks
            .iter()
            .map(|chunk| chunk.chunk_id.as_str())
            .collect();
        let stale_ids: Vec<String> = self
            .index
            .ids_for_title(&document.title)?
            .into_iter()
            .filter(|id| !current.contains(id.as_str()))
            .collect();

        let mut stale_purged = 0;
        if !stale_ids.is_empty() {
            if self.purge_stale_chunks {
                stale_purged = self.index.delete(&stale_ids)?;
                warn!(
                    "Purged {} stale chunks for '{}': {:?}",
                    stale_purged, document.title, stale_ids
                );
            } else {
                warn!(
                    "Leaving {} stale chunks for '{}' in the index: {:?}",
                    stale_ids.len(),
                    document.title,
                    stale_ids
                );
            }
        }

        self.ledger.record(
            &document.title,
            &document.content_hash,
            document.chunks.len(),
            self.embedder.model_name(),
        )?;

        info!(
            "Embedded '{}': {} chunks in {}ms",
            document.title,
            upserted,
            start.elapsed().as_millis()
        );

        Ok(EmbedOutcome {
            embedded: true,
            chunks_upserted: upserted,
            stale_ids,
            stale_purged,
        })
    }

    /// Refuse to mix vectors from different embedding models
    ///
    /// When forced, a collection built with another model is emptied so it
    /// can be rebuilt with the configured one.
    fn check_embedding_model(&self, force: bool) -> Result<()> {
        let configured = self.embedder.model_name();
        let others: Vec<String> = self
            .ledger
            .models()?
            .into_iter()
            .filter(|model| model != configured)
            .collect();
        if others.is_empty() {
            return Ok(());
        }

        let indexed = others.join(", ");
        if !force {
            return Err(ScriptRagError::EmbeddingModelChanged {
                indexed,
                configured: configured.to_string(),
            });
        }

        let records = self.index.clear()?;
        let documents = self.ledger.clear()?;
        warn!(
            "Embedding model changed from '{}' to '{}': cleared {} records of {} documents from '{}'",
            indexed,
            configured,
            records,
            documents,
            self.index.collection()
        );
        Ok(())
    }

    /// Chunk then embed a single document
    pub async fn ingest(&self, document: &Document, force: bool) -> Result<IngestReport> {
        self.ingest_all(std::slice::from_ref(document), force).await
    }

    /// Chunk then embed every document, in order
    pub async fn ingest_all(&self, documents: &[Document], force: bool) -> Result<IngestReport> {
        let start = Instant::now();
        let mut report = IngestReport::default();

        for document in documents {
            let chunked = self.chunk_document(document, force)?;
            report.record_chunking(&chunked);
            let embedded = self.embed_document(&chunked.document, force).await?;
            report.record_embedding(&embedded);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!("{}", report);
        Ok(report)
    }

    /// Embedding stage only, over everything in the chunk store
    pub async fn embed_all(&self, force: bool) -> Result<IngestReport> {
        let start = Instant::now();
        let mut report = IngestReport::default();

        for document in self.chunking.chunk_store().list()? {
            let embedded = self.embed_document(&document, force).await?;
            report.record_embedding(&embedded);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!("{}", report);
        Ok(report)
    }
}
