//! SQLite database management with migrations
//!
//! Holds the embedding records behind the vector index and the ingestion
//! ledger. The file persists across process restarts.

use crate::error::{Result, ScriptRagError};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database file
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ScriptRagError::IndexUnavailable(format!(
                    "Failed to create index directory {:?}: {}",
                    parent, e
                ))
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(16) // Max 16 connections
            .build(manager)
            .map_err(|e| {
                ScriptRagError::IndexUnavailable(format!("Failed to open {:?}: {}", db_path, e))
            })?;

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| ScriptRagError::IndexUnavailable(format!("No connection: {}", e)))
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: embedding records and ingestion ledger
    r#"
    CREATE TABLE embeddings (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        title TEXT NOT NULL,
        document TEXT NOT NULL,
        metadata TEXT NOT NULL,  -- JSON metadata
        vector BLOB NOT NULL,    -- little-endian f32
        dimension INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (collection, id)
    );

    CREATE INDEX idx_embeddings_title ON embeddings(collection, title);

    CREATE TABLE ingested_documents (
        collection TEXT NOT NULL,
        title TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        chunk_count INTEGER NOT NULL,
        ingested_at INTEGER NOT NULL,
        PRIMARY KEY (collection, title)
    );
    "#,
    // Migration 2: embedding model that produced each document's vectors
    r#"
    ALTER TABLE ingested_documents ADD COLUMN embedding_model TEXT NOT NULL DEFAULT '';
    "#,
];
