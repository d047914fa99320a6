//! Token-window chunking
//!
//! Documents are split into fixed-size token windows that overlap by a fixed
//! number of tokens. Each window is decoded back to text and numbered from 1
//! in window order, giving ids of the form `{document}_{n}`.

mod tokenizer;

pub use tokenizer::{BpeTokenizer, Tokenizer};

use crate::error::{Result, ScriptRagError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default window size in tokens
pub const CHUNK_SIZE: usize = 512;
/// Default number of tokens shared by consecutive windows
pub const OVERLAP: usize = 256;

/// A decoded token window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
}

/// Window parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkingParams {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(ScriptRagError::InvalidConfigValue {
                path: "chunking".to_string(),
                message: format!(
                    "overlap ({}) must be smaller than a non-zero chunk size ({})",
                    overlap, chunk_size
                ),
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Distance between the starts of consecutive windows
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            overlap: OVERLAP,
        }
    }
}

/// Splits document text into overlapping token windows
#[derive(Clone)]
pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
    params: ChunkingParams,
}

impl Chunker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, params: ChunkingParams) -> Self {
        Self { tokenizer, params }
    }

    pub fn params(&self) -> ChunkingParams {
        self.params
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    /// Chunk `text`, naming windows after `document_name`
    ///
    /// Windows start every `stride` tokens until the start passes the end of
    /// the token sequence; the trailing windows may be shorter than
    /// `chunk_size`. Empty text yields no chunks.
    pub fn chunk(&self, text: &str, document_name: &str) -> Result<Vec<Chunk>> {
        let tokens = self.tokenizer.encode(text);
        let stride = self.params.stride();

        let mut chunks = Vec::with_capacity(tokens.len().div_ceil(stride));
        for start in (0..tokens.len()).step_by(stride) {
            let end = (start + self.params.chunk_size).min(tokens.len());
            let text = self.decode_window(&tokens[start..end])?;
            chunks.push(Chunk {
                chunk_id: format!("{}_{}", document_name, chunks.len() + 1),
                text,
            });
        }

        Ok(chunks)
    }

    /// Decode a window, shedding edge tokens that split a UTF-8 character
    ///
    /// A multi-byte character can straddle a window boundary. At most three
    /// continuation bytes can dangle on either side, so at most three tokens
    /// per edge are dropped. A window made only of fragments falls back to a
    /// per-token decode with U+FFFD standing in for undecodable tokens.
    fn decode_window(&self, window: &[u32]) -> Result<String> {
        if let Ok(text) = self.tokenizer.decode(window) {
            return Ok(text);
        }

        for trim_front in 0..=3 {
            for trim_back in 0..=3 {
                if trim_front + trim_back >= window.len() {
                    continue;
                }
                let trimmed = &window[trim_front..window.len() - trim_back];
                if let Ok(text) = self.tokenizer.decode(trimmed) {
                    return Ok(text);
                }
            }
        }

        tracing::debug!("Lossy decode of {}-token window", window.len());
        Ok(window
            .iter()
            .map(|token| {
                self.tokenizer
                    .decode(std::slice::from_ref(token))
                    .unwrap_or_else(|_| char::REPLACEMENT_CHARACTER.to_string())
            })
            .collect())
    }
}
