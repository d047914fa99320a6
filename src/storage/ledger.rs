/// Record of which document versions have been embedded into a collection
use super::Database;
use crate::error::Result;
use rusqlite::{params, OptionalExtension};

/// Ledger row for one ingested document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub title: String,
    pub content_hash: String,
    pub chunk_count: usize,
    /// Model that produced the stored vectors
    pub embedding_model: String,
    /// Unix milliseconds
    pub ingested_at: i64,
}

/// Tracks the content hash each document was last embedded at, so an
/// unchanged document can be skipped on re-ingestion.
#[derive(Clone)]
pub struct IngestLedger {
    database: Database,
    collection: String,
}

impl IngestLedger {
    pub fn new(database: Database, collection: impl Into<String>) -> Self {
        Self {
            database,
            collection: collection.into(),
        }
    }

    pub fn get(&self, title: &str) -> Result<Option<LedgerEntry>> {
        let conn = self.database.get_conn()?;
        let entry = conn
            .query_row(
                "SELECT title, content_hash, chunk_count, embedding_model, ingested_at
                 FROM ingested_documents
                 WHERE collection = ?1 AND title = ?2",
                params![self.collection, title],
                |row| {
                    Ok(LedgerEntry {
                        title: row.get(0)?,
                        content_hash: row.get(1)?,
                        chunk_count: row.get::<_, i64>(2)? as usize,
                        embedding_model: row.get(3)?,
                        ingested_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    pub fn record(
        &self,
        title: &str,
        content_hash: &str,
        chunk_count: usize,
        embedding_model: &str,
    ) -> Result<()> {
        let conn = self.database.get_conn()?;
        conn.execute(
            "INSERT INTO ingested_documents
                (collection, title, content_hash, chunk_count, embedding_model, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(collection, title) DO UPDATE SET
                content_hash = excluded.content_hash,
                chunk_count = excluded.chunk_count,
                embedding_model = excluded.embedding_model,
                ingested_at = excluded.ingested_at",
            params![
                self.collection,
                title,
                content_hash,
                chunk_count as i64,
                embedding_model,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Distinct embedding models recorded in this collection
    pub fn models(&self) -> Result<Vec<String>> {
        let conn = self.database.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT embedding_model FROM ingested_documents
             WHERE collection = ?1 ORDER BY embedding_model",
        )?;
        let models = stmt
            .query_map(params![self.collection], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(models)
    }

    /// Forget every document in this collection
    pub fn clear(&self) -> Result<usize> {
        let conn = self.database.get_conn()?;
        let removed = conn.execute(
            "DELETE FROM ingested_documents WHERE collection = ?1",
            params![self.collection],
        )?;
        Ok(removed)
    }

    pub fn remove(&self, title: &str) -> Result<bool> {
        let conn = self.database.get_conn()?;
        let removed = conn.execute(
            "DELETE FROM ingested_documents WHERE collection = ?1 AND title = ?2",
            params![self.collection, title],
        )?;
        Ok(removed > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.database.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ingested_documents WHERE collection = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_get() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("ledger.sqlite")).unwrap();
        let ledger = IngestLedger::new(db, "movie_scripts");

        assert!(ledger.get("Inception").unwrap().is_none());

        ledger.record("Inception", "abc", 12, "bge-small").unwrap();
        ledger.record("Inception", "def", 14, "bge-small").unwrap();

        let entry = ledger.get("Inception").unwrap().unwrap();
        assert_eq!(entry.content_hash, "def");
        assert_eq!(entry.chunk_count, 14);
        assert_eq!(entry.embedding_model, "bge-small");
        assert_eq!(ledger.count().unwrap(), 1);

        assert!(ledger.remove("Inception").unwrap());
        assert!(!ledger.remove("Inception").unwrap());
    }

    #[test]
    fn test_collections_are_separate() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("ledger.sqlite")).unwrap();
        let a = IngestLedger::new(db.clone(), "a");
        let b = IngestLedger::new(db, "b");

        a.record("Tenet", "hash", 3, "bge-small").unwrap();
        assert!(b.get("Tenet").unwrap().is_none());
    }

    #[test]
    fn test_models_and_clear() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("ledger.sqlite")).unwrap();
        let ledger = IngestLedger::new(db, "movie_scripts");

        ledger.record("Tenet", "h1", 3, "text-embedding-004").unwrap();
        ledger.record("Alien", "h2", 5, "bge-small").unwrap();
        ledger.record("Heat", "h3", 2, "bge-small").unwrap();
        assert_eq!(
            ledger.models().unwrap(),
            vec!["bge-small", "text-embedding-004"]
        );

        assert_eq!(ledger.clear().unwrap(), 3);
        assert!(ledger.models().unwrap().is_empty());
        assert_eq!(ledger.count().unwrap(), 0);
    }
}
