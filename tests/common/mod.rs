//! Deterministic stand-ins for the network providers
#![allow(dead_code)]

use async_trait::async_trait;
use scriptrag::app::AppContext;
use scriptrag::config::Config;
use scriptrag::embedding::{EmbedMode, EmbeddingProvider};
use scriptrag::error::Result;
use scriptrag::generation::Generator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

pub const DIMENSION: usize = 64;

/// Feature-hashing bag of words embedder
///
/// Words are lowercased and stripped of punctuation, then hashed into a
/// fixed number of buckets. Texts that share words end up close.
pub struct HashingEmbedder {
    name: String,
    dimension: usize,
    modes: Mutex<Vec<EmbedMode>>,
    calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::named("hashing", DIMENSION)
    }

    /// A differently named model, optionally with another bucket count
    pub fn named(name: &str, dimension: usize) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            modes: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Mode of every text embedded so far, in call order
    pub fn modes(&self) -> Vec<EmbedMode> {
        self.modes.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let dimension = self.dimension;
        let mut vector = vec![0.0f32; dimension];
        for word in text.split_whitespace() {
            let word: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if word.is_empty() {
                continue;
            }
            let hash = blake3::hash(word.as_bytes());
            let bucket = u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap());
            vector[(bucket % dimension as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.modes.lock().unwrap().push(mode);
        Ok(self.vector(text))
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Generator that answers with the context sentences mentioning the question
///
/// Records every prompt so tests can check what reached the model.
pub struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let context = prompt
            .split("Context:\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\nQuestion: ").next())
            .unwrap_or_default();
        let question = prompt
            .split("Question: ")
            .nth(1)
            .and_then(|rest| rest.split("\n\nAnswer:").next())
            .unwrap_or_default()
            .to_lowercase();
        let keywords: Vec<String> = question
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| word.len() > 3)
            .map(str::to_string)
            .collect();

        let answer: Vec<&str> = context
            .split_inclusive('.')
            .map(str::trim)
            .filter(|sentence| {
                let lower = sentence.to_lowercase();
                keywords.iter().any(|word| lower.contains(word.as_str()))
            })
            .collect();

        // Padding checks that callers trim the response
        Ok(format!("  {}\n", answer.join(" ")))
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

/// Default configuration rooted in a temporary data directory
pub fn test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = temp.path().to_path_buf();
    config.resilience.timeout_secs = 5;
    config.resilience.initial_backoff_ms = 1;
    config.resilience.max_backoff_ms = 2;
    config
}

pub fn open_app(temp: &TempDir) -> AppContext {
    AppContext::open(&test_config(temp)).unwrap()
}
