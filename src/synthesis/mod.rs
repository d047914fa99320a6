//! Grounded answer synthesis
//!
//! Retrieves passages for a question, packs them into a bounded context and
//! asks the generator to answer from that context alone. When retrieval
//! comes back empty the fixed fallback answer is returned and the generator
//! is never called.

mod prompt;

pub use prompt::{build_context, build_prompt, Context};

use crate::chunking::Tokenizer;
use crate::config::SynthesisConfig;
use crate::error::{Result, ScriptRagError};
use crate::generation::Generator;
use crate::resilience::RetryPolicy;
use crate::retrieval::Retriever;
use std::sync::Arc;
use tracing::{debug, info};

/// Answer returned when retrieval finds nothing
pub const FALLBACK_ANSWER: &str = "Sorry, I couldn't find relevant information in the scripts.";

/// Synthesized answer with the passages it was grounded on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    /// Passages placed in the prompt context, in rank order
    pub passages: Vec<String>,
    pub used_fallback: bool,
}

pub struct AnswerSynthesizer {
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generator>,
    tokenizer: Arc<dyn Tokenizer>,
    retry: RetryPolicy,
    context_token_budget: usize,
    fallback_answer: String,
}

impl AnswerSynthesizer {
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Arc<dyn Generator>,
        tokenizer: Arc<dyn Tokenizer>,
        retry: RetryPolicy,
        config: &SynthesisConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            tokenizer,
            retry,
            context_token_budget: config.context_token_budget,
            fallback_answer: config.fallback_answer.clone(),
        }
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    /// Answer text for `query`
    pub async fn synthesize(&self, query: &str) -> Result<String> {
        Ok(self.synthesize_detailed(query, None).await?.text)
    }

    /// Answer plus the context it was built from
    pub async fn synthesize_detailed(&self, query: &str, top_k: Option<usize>) -> Result<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ScriptRagError::EmptyQuery);
        }

        let passages = self.retriever.retrieve(query, top_k).await?;
        if passages.is_empty() {
            info!("No relevant passages found, returning fallback answer");
            return Ok(Answer {
                text: self.fallback_answer.clone(),
                passages: Vec::new(),
                used_fallback: true,
            });
        }

        let context = build_context(
            &passages,
            self.tokenizer.as_ref(),
            self.context_token_budget,
        )?;
        let prompt = build_prompt(&context.text, query);
        debug!(
            "Prompt context: {} passages, {} tokens",
            context.passages.len(),
            context.tokens
        );

        let generator = &self.generator;
        let prompt = prompt.as_str();
        let response = self
            .retry
            .run("generation", move || async move {
                generator.generate(prompt).await
            })
            .await?;

        info!(
            "Answered query from {} passages with {}",
            context.passages.len(),
            self.generator.model_name()
        );

        Ok(Answer {
            text: response.trim().to_string(),
            passages: context.passages,
            used_fallback: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::BpeTokenizer;
    use crate::embedding::{EmbedMode, EmbeddingProvider};
    use crate::storage::{ChunkMetadata, Database, HnswParams, IndexRecord, VectorIndex};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct ConstantEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ConstantEmbedder {
        async fn embed(&self, _text: &str, _mode: EmbedMode) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> Option<usize> {
            Some(2)
        }

        fn model_name(&self) -> &str {
            "constant"
        }
    }

    /// Fails transiently `failures` times, then answers with padding
    struct FlakyGenerator {
        calls: AtomicUsize,
        failures: usize,
        permanent: bool,
    }

    impl FlakyGenerator {
        fn new(failures: usize, permanent: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
                permanent,
            }
        }
    }

    #[async_trait]
    impl Generator for FlakyGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                return Err(ScriptRagError::permanent("test", "invalid key"));
            }
            if call < self.failures {
                return Err(ScriptRagError::transient("test", "rate limited"));
            }
            Ok("  Beta.\n".to_string())
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    fn synthesizer(temp: &TempDir, generator: Arc<FlakyGenerator>, populated: bool) -> AnswerSynthesizer {
        let db = Database::new(&temp.path().join("index.sqlite")).unwrap();
        let index = Arc::new(VectorIndex::new(db, "test", HnswParams::default()));
        if populated {
            index
                .upsert(&IndexRecord {
                    id: "TestFilm_1".to_string(),
                    vector: vec![1.0, 0.0],
                    document: "Beta betrays Alpha.".to_string(),
                    metadata: ChunkMetadata {
                        title: "TestFilm".to_string(),
                        chunk_id: "TestFilm_1".to_string(),
                    },
                })
                .unwrap();
        }

        let retry = RetryPolicy::new(
            Duration::from_secs(5),
            2,
            Duration::from_millis(1),
            Duration::from_millis(2),
        );
        let retriever = Arc::new(Retriever::new(
            Arc::new(ConstantEmbedder),
            index,
            retry.clone(),
            3,
        ));
        let config = SynthesisConfig {
            context_token_budget: 6000,
            fallback_answer: FALLBACK_ANSWER.to_string(),
        };

        AnswerSynthesizer::new(
            retriever,
            generator,
            Arc::new(BpeTokenizer::cl100k().unwrap()),
            retry,
            &config,
        )
    }

    #[tokio::test]
    async fn test_fallback_skips_generator() {
        let temp = TempDir::new().unwrap();
        let generator = Arc::new(FlakyGenerator::new(0, false));
        let synth = synthesizer(&temp, generator.clone(), false);

        let answer = synth.synthesize_detailed("Who betrays whom?", None).await.unwrap();
        assert!(answer.used_fallback);
        assert_eq!(answer.text, FALLBACK_ANSWER);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_response_is_trimmed_after_retries() {
        let temp = TempDir::new().unwrap();
        let generator = Arc::new(FlakyGenerator::new(2, false));
        let synth = synthesizer(&temp, generator.clone(), true);

        let answer = synth.synthesize_detailed("Who betrays whom?", None).await.unwrap();
        assert_eq!(answer.text, "Beta.");
        assert_eq!(answer.passages, vec!["Beta betrays Alpha."]);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_fast() {
        let temp = TempDir::new().unwrap();
        let generator = Arc::new(FlakyGenerator::new(0, true));
        let synth = synthesizer(&temp, generator.clone(), true);

        let err = synth.synthesize("Who betrays whom?").await.unwrap_err();
        assert!(matches!(err, ScriptRagError::Provider { .. }));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_query() {
        let temp = TempDir::new().unwrap();
        let generator = Arc::new(FlakyGenerator::new(0, false));
        let synth = synthesizer(&temp, generator, true);

        assert!(matches!(
            synth.synthesize("").await,
            Err(ScriptRagError::EmptyQuery)
        ));
    }
}
