//! Screenplay documents as produced by the extraction step
//!
//! Extraction (PDF to text) happens outside this crate; it leaves one
//! `{title, text}` JSON file per script, which is what this module reads.

use crate::error::{Result, ScriptRagError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A normalized screenplay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub text: String,
}

impl Document {
    /// Build a document, normalizing both title and body
    ///
    /// Underscores and non-breaking spaces in the title become spaces, and
    /// all whitespace runs in the body collapse to a single space.
    pub fn normalized(title: &str, text: &str) -> Self {
        Self {
            title: normalize_title(title),
            text: collapse_whitespace(text),
        }
    }

    /// Chunk id prefix for this document
    pub fn key(&self) -> String {
        document_key(&self.title)
    }
}

/// Title with separators unified and whitespace collapsed
pub fn normalize_title(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if c == '_' || c == '\u{a0}' { ' ' } else { c })
        .collect();
    collapse_whitespace(&replaced)
}

/// Key derived from a normalized title: spaces become underscores
pub fn document_key(title: &str) -> String {
    title.replace(' ', "_")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Load a single extracted document
pub fn load_file(path: &Path) -> Result<Document> {
    let content = std::fs::read_to_string(path).map_err(|e| ScriptRagError::Io {
        source: e,
        context: format!("Failed to read document: {}", path.display()),
    })?;
    let raw: Document = serde_json::from_str(&content).map_err(|e| ScriptRagError::Json {
        source: e,
        context: format!("Malformed document: {}", path.display()),
    })?;
    Ok(Document::normalized(&raw.title, &raw.text))
}

/// Load every `*.json` document in a directory, ordered by file name
pub fn load_dir(dir: &Path) -> Result<Vec<Document>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ScriptRagError::Io {
        source: e,
        context: format!("Failed to read document directory: {}", dir.display()),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScriptRagError::Io {
            source: e,
            context: "Failed to read directory entry".to_string(),
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(|path| load_file(path)).collect()
}
