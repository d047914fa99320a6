//! Durable chunk lists, one JSON file per document
//!
//! Chunking and embedding are separate passes. The chunk store holds the
//! output of the first so the second can run later (or again) without
//! re-tokenizing every script.

use crate::chunking::Chunk;
use crate::documents::document_key;
use crate::error::{Result, ScriptRagError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Chunks for one document, tagged with the content they came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkedDocument {
    pub title: String,
    pub content_hash: String,
    pub chunks: Vec<Chunk>,
}

pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| ScriptRagError::Io {
            source: e,
            context: format!("Failed to create chunk store: {}", dir.display()),
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, title: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(title)))
    }

    /// Write (or replace) the chunk list for a document
    pub fn save(&self, document: &ChunkedDocument) -> Result<PathBuf> {
        let path = self.path_for(&document.title);
        let json = serde_json::to_string_pretty(document).map_err(|e| ScriptRagError::Json {
            source: e,
            context: format!("Failed to encode chunks for {}", document.title),
        })?;

        // Write to a sibling then rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| ScriptRagError::Io {
            source: e,
            context: format!("Failed to write {}", tmp.display()),
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| ScriptRagError::Io {
            source: e,
            context: format!("Failed to move chunks into {}", path.display()),
        })?;

        Ok(path)
    }

    pub fn load(&self, title: &str) -> Result<Option<ChunkedDocument>> {
        let path = self.path_for(title);
        if !path.exists() {
            return Ok(None);
        }
        read_chunk_file(&path).map(Some)
    }

    /// Every stored document, ordered by file name
    pub fn list(&self) -> Result<Vec<ChunkedDocument>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| ScriptRagError::Io {
            source: e,
            context: format!("Failed to read chunk store: {}", self.dir.display()),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ScriptRagError::Io {
                source: e,
                context: "Failed to read chunk store entry".to_string(),
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        paths.iter().map(|path| read_chunk_file(path)).collect()
    }
}

/// File name (without extension) for a title's chunk file
///
/// Plain keys are used as they are. Anything else is reduced to safe
/// characters and suffixed with a hash of the title so distinct titles
/// never share a file and no title can name a path outside the store.
fn file_stem(title: &str) -> String {
    let key = document_key(title);
    let plain = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if plain {
        return key;
    }

    let safe: String = key
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let digest = blake3::hash(title.as_bytes()).to_hex();
    format!("{}-{}", safe, &digest[..12])
}

fn read_chunk_file(path: &Path) -> Result<ChunkedDocument> {
    let content = std::fs::read_to_string(path).map_err(|e| ScriptRagError::Io {
        source: e,
        context: format!("Failed to read {}", path.display()),
    })?;
    serde_json::from_str(&content).map_err(|e| ScriptRagError::Json {
        source: e,
        context: format!("Malformed chunk file: {}", path.display()),
    })
}
