//! Storage layer for ScriptRag
//!
//! Everything durable lives under the data directory:
//! - `processed/`: chunk store, one JSON file per document
//! - `index/vectors.sqlite`: embedding records and the ingestion ledger
//! - `logs/`: query log (written by the server)

pub mod chunk_store;
pub mod database;
pub mod ledger;
pub mod vector_index;

pub use chunk_store::{ChunkStore, ChunkedDocument};
pub use database::{Database, DbPool};
pub use ledger::{IngestLedger, LedgerEntry};
pub use vector_index::{
    ChunkMetadata, HnswParams, IndexRecord, MetadataFilter, QueryMatch, StoredRecord, VectorIndex,
};
