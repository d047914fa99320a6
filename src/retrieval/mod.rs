//! Query-side retrieval
//!
//! Embeds the question in query mode, searches the vector index and returns
//! the matching passages nearest-first. An empty index is not an error: it
//! yields an empty result.

use crate::embedding::{EmbedMode, EmbeddingProvider};
use crate::error::{Result, ScriptRagError};
use crate::resilience::RetryPolicy;
use crate::storage::{MetadataFilter, QueryMatch, VectorIndex};
use std::sync::Arc;
use tracing::debug;

/// Default number of passages returned per query
pub const DEFAULT_TOP_K: usize = 3;

/// Retriever over one vector index
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    retry: RetryPolicy,
    default_top_k: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        retry: RetryPolicy,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            retry,
            default_top_k,
        }
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Passage texts for `query`, most similar first
    ///
    /// `top_k` falls back to the configured default when `None`.
    pub async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<Vec<String>> {
        let matches = self.retrieve_matches(query, top_k, None).await?;
        Ok(matches.into_iter().map(|m| m.document).collect())
    }

    /// Ranked matches with ids, metadata and distances
    pub async fn retrieve_matches(
        &self,
        query: &str,
        top_k: Option<usize>,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ScriptRagError::EmptyQuery);
        }

        let top_k = top_k.unwrap_or(self.default_top_k);
        if top_k == 0 {
            return Err(ScriptRagError::InvalidTopK(top_k));
        }

        let embedder = &self.embedder;
        let vector = self
            .retry
            .run("query embedding", move || async move {
                embedder.embed(query, EmbedMode::Query).await
            })
            .await?;

        let index = Arc::clone(&self.index);
        let matches = tokio::task::spawn_blocking(move || {
            index.query(&vector, top_k, filter.as_ref())
        })
        .await
        .map_err(|e| ScriptRagError::IndexUnavailable(format!("search task failed: {}", e)))??;

        debug!("Retrieved {} passages (top_k = {})", matches.len(), top_k);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChunkMetadata, Database, HnswParams, IndexRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Maps "alpha"/"beta" to fixed axes and records the mode of every call
    struct AxisEmbedder {
        modes: Mutex<Vec<EmbedMode>>,
    }

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
            self.modes.lock().unwrap().push(mode);
            let text = text.to_lowercase();
            Ok(vec![
                if text.contains("alpha") { 1.0 } else { 0.0 },
                if text.contains("beta") { 1.0 } else { 0.0 },
                0.1,
            ])
        }

        fn dimension(&self) -> Option<usize> {
            Some(3)
        }

        fn model_name(&self) -> &str {
            "axis"
        }
    }

    fn setup(temp: &TempDir) -> (Arc<AxisEmbedder>, Retriever) {
        let db = Database::new(&temp.path().join("index.sqlite")).unwrap();
        let index = Arc::new(VectorIndex::new(db, "test", HnswParams::default()));
        let embedder = Arc::new(AxisEmbedder {
            modes: Mutex::new(Vec::new()),
        });
        let retriever = Retriever::new(
            embedder.clone(),
            index,
            RetryPolicy::no_retry(Duration::from_secs(5)),
            DEFAULT_TOP_K,
        );
        (embedder, retriever)
    }

    fn record(id: &str, text: &str, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            vector,
            document: text.to_string(),
            metadata: ChunkMetadata {
                title: "Film".to_string(),
                chunk_id: id.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let temp = TempDir::new().unwrap();
        let (_, retriever) = setup(&temp);

        let passages = retriever.retrieve("anything about alpha", None).await.unwrap();
        assert!(passages.is_empty());
    }

    #[tokio::test]
    async fn test_query_mode_and_ranking() {
        let temp = TempDir::new().unwrap();
        let (embedder, retriever) = setup(&temp);

        retriever
            .index()
            .upsert_batch(&[
                record("Film_1", "alpha scene", vec![1.0, 0.0, 0.1]),
                record("Film_2", "beta scene", vec![0.0, 1.0, 0.1]),
            ])
            .unwrap();

        let passages = retriever.retrieve("where is beta?", Some(1)).await.unwrap();
        assert_eq!(passages, vec!["beta scene"]);
        assert_eq!(*embedder.modes.lock().unwrap(), vec![EmbedMode::Query]);
    }

    #[tokio::test]
    async fn test_blank_query_rejected_before_embedding() {
        let temp = TempDir::new().unwrap();
        let (embedder, retriever) = setup(&temp);

        let err = retriever.retrieve("   ", None).await.unwrap_err();
        assert!(matches!(err, ScriptRagError::EmptyQuery));
        assert!(embedder.modes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let temp = TempDir::new().unwrap();
        let (_, retriever) = setup(&temp);

        let err = retriever.retrieve("alpha", Some(0)).await.unwrap_err();
        assert!(matches!(err, ScriptRagError::InvalidTopK(0)));
    }
}
