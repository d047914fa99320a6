/// BPE tokenizer shared by the chunker and the prompt context budget
use crate::error::{Result, ScriptRagError};
use tiktoken_rs::CoreBPE;

/// Trait for tokenizers
///
/// Chunk windows and prompt budgets are both measured in the tokens of
/// whatever implementation is plugged in here.
pub trait Tokenizer: Send + Sync {
    /// Encode text into token ids, treating special-token text as plain text
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode token ids back into text
    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Encoding name (e.g., "cl100k_base")
    fn name(&self) -> &str;

    /// Number of tokens in `text`
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// tiktoken byte-pair encoder
pub struct BpeTokenizer {
    bpe: CoreBPE,
    encoding: String,
}

impl BpeTokenizer {
    /// Create a tokenizer for a named encoding
    ///
    /// The merge tables ship inside `tiktoken-rs`, so no download happens.
    pub fn new(encoding: &str) -> Result<Self> {
        let bpe = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            _ => {
                return Err(ScriptRagError::Tokenizer(format!(
                    "Unsupported encoding: {}. Supported: cl100k_base, o200k_base, p50k_base",
                    encoding
                )));
            }
        }
        .map_err(|e| ScriptRagError::Tokenizer(e.to_string()))?;

        Ok(Self {
            bpe,
            encoding: encoding.to_string(),
        })
    }

    /// Tokenizer matching OpenAI's GPT-3.5/4 family
    pub fn cl100k() -> Result<Self> {
        Self::new("cl100k_base")
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|token| token as u32)
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.bpe
            .decode(tokens.iter().map(|&token| token as _).collect())
            .map_err(|e| ScriptRagError::Tokenizer(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.encoding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let tokenizer = BpeTokenizer::cl100k().unwrap();
        let text = "INT. DREAM LEVEL ONE - RAIN-SLICKED STREET - DAY";

        let tokens = tokenizer.encode(text);
        assert!(!tokens.is_empty());
        assert_eq!(tokenizer.decode(&tokens).unwrap(), text);
        assert_eq!(tokenizer.count(text), tokens.len());
    }

    #[test]
    fn test_empty_text() {
        let tokenizer = BpeTokenizer::cl100k().unwrap();
        assert!(tokenizer.encode("").is_empty());
    }

    #[test]
    fn test_special_token_text_is_plain() {
        let tokenizer = BpeTokenizer::cl100k().unwrap();
        let tokens = tokenizer.encode("<|endoftext|>");
        assert!(tokens.len() > 1);
    }

    #[test]
    fn test_unsupported_encoding() {
        assert!(BpeTokenizer::new("gpt2-ish").is_err());
    }
}
