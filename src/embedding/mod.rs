//! Embedding capability
//!
//! Text is embedded either as a document (at ingestion) or as a query (at
//! retrieval). Providers may encode the two differently, so the mode is
//! carried on every call rather than collapsed into a single encoding.
//! - FastEmbedProvider: local ONNX model, offline
//! - GeminiEmbedder: hosted `embedContent` API with retrieval task types

mod gemini;
mod provider;

pub use gemini::GeminiEmbedder;
pub use provider::{EmbeddingProvider, FastEmbedProvider};

use serde::{Deserialize, Serialize};

/// Which side of retrieval a text is embedded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedMode {
    /// Passages stored in the index
    Document,
    /// Questions searched against the index
    Query,
}

impl std::fmt::Display for EmbedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedMode::Document => write!(f, "document"),
            EmbedMode::Query => write!(f, "query"),
        }
    }
}
