//! Prompt assembly under a token budget

use crate::chunking::Tokenizer;
use crate::error::Result;

const INSTRUCTION: &str = "You are an expert at answering questions based on movie scripts.\n\
Given the following context from a script, answer the user's question.";

const PASSAGE_SEPARATOR: &str = "\n\n";

/// Context block built from ranked passages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    /// Passages that made it into the context, in rank order
    pub passages: Vec<String>,
    pub text: String,
    pub tokens: usize,
}

/// Join passages in rank order until the budget is exhausted
///
/// The first passage that does not fit is dropped along with every
/// lower-ranked one. A top passage larger than the whole budget is cut down
/// to the budget instead of being dropped.
pub fn build_context(
    passages: &[String],
    tokenizer: &dyn Tokenizer,
    budget: usize,
) -> Result<Context> {
    let separator_tokens = tokenizer.count(PASSAGE_SEPARATOR);
    let mut selected: Vec<String> = Vec::new();
    let mut used = 0;

    for passage in passages {
        let cost = tokenizer.count(passage);
        let extra = if selected.is_empty() {
            cost
        } else {
            cost + separator_tokens
        };

        if used + extra <= budget {
            selected.push(passage.clone());
            used += extra;
            continue;
        }

        if selected.is_empty() && budget > 0 {
            let truncated = truncate_to_tokens(passage, tokenizer, budget)?;
            used = tokenizer.count(&truncated);
            selected.push(truncated);
        }
        break;
    }

    if selected.len() < passages.len() {
        tracing::debug!(
            "Context budget {} kept {} of {} passages",
            budget,
            selected.len(),
            passages.len()
        );
    }

    Ok(Context {
        text: selected.join(PASSAGE_SEPARATOR),
        passages: selected,
        tokens: used,
    })
}

/// Full generation prompt for a question over a context block
pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        INSTRUCTION, context, query
    )
}

fn truncate_to_tokens(text: &str, tokenizer: &dyn Tokenizer, max_tokens: usize) -> Result<String> {
    let tokens = tokenizer.encode(text);
    let mut end = max_tokens.min(tokens.len());

    // A cut inside a multi-byte character leaves an undecodable tail; back
    // off a few tokens until the prefix decodes.
    let floor = end.saturating_sub(4);
    loop {
        match tokenizer.decode(&tokens[..end]) {
            Ok(prefix) => return Ok(prefix),
            Err(e) if end <= floor || end == 0 => return Err(e),
            Err(_) => end -= 1,
        }
    }
}
