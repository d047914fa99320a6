/// Append-only JSONL log of served queries
use crate::error::{Result, ScriptRagError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One line of the query log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub query: String,
    pub response: String,
}

pub struct QueryLog {
    path: PathBuf,
    // Serializes appends so concurrent requests never interleave lines
    write_lock: Mutex<()>,
}

impl QueryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry
    pub async fn append(&self, query: &str, response: &str) -> Result<()> {
        let entry = QueryLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            query: query.to_string(),
            response: response.to_string(),
        };
        let mut line = serde_json::to_string(&entry).map_err(|e| ScriptRagError::Json {
            source: e,
            context: "Failed to encode query log entry".to_string(),
        })?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ScriptRagError::Io {
                    source: e,
                    context: format!("Failed to create log directory {}", parent.display()),
                })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ScriptRagError::Io {
                source: e,
                context: format!("Failed to open query log {}", self.path.display()),
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ScriptRagError::Io {
                source: e,
                context: "Failed to append to query log".to_string(),
            })?;

        Ok(())
    }

    /// Append, downgrading any failure to a warning
    pub async fn record(&self, query: &str, response: &str) {
        if let Err(e) = self.append(query, response).await {
            tracing::warn!("Query log write failed: {}", e);
        }
    }
}
