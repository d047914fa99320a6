/// Persistent vector index with HNSW nearest-neighbour search
use super::Database;
use crate::error::{Result, ScriptRagError};
use hnsw_rs::prelude::*;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Metadata stored alongside every embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub chunk_id: String,
}

/// One record to write into the index
#[derive(Debug, Clone)]
pub struct IndexRecord {
    /// Record id (the chunk id); writing an existing id overwrites it
    pub id: String,
    pub vector: Vec<f32>,
    pub document: String,
    pub metadata: ChunkMetadata,
}

/// Equality filter over record metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub title: Option<String>,
    pub chunk_id: Option<String>,
}

impl MetadataFilter {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            chunk_id: None,
        }
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.title.as_ref().map_or(true, |t| *t == metadata.title)
            && self
                .chunk_id
                .as_ref()
                .map_or(true, |c| *c == metadata.chunk_id)
    }
}

/// A ranked search hit
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance (0.0 = identical direction)
    pub distance: f32,
}

/// A stored record returned by [`VectorIndex::get`]
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    pub vector: Option<Vec<f32>>,
}

/// HNSW graph parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Number of connections per layer
    pub m: usize,
    /// Construction beam width (higher = better recall, slower build)
    pub ef_construction: usize,
    /// Search beam width (higher = better recall, slower search)
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

const MAX_LAYERS: usize = 16;
/// Extra candidates requested from the graph beyond `top_k`
const OVERFETCH: usize = 8;

/// In-memory search graph built from one state of the records table
struct GraphSnapshot {
    fingerprint: Fingerprint,
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// Position in this vector is the HNSW data id
    entries: Vec<SnapshotEntry>,
    dimension: Option<usize>,
}

struct SnapshotEntry {
    id: String,
    document: String,
    metadata: ChunkMetadata,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    generation: u64,
    count: i64,
    last_update: i64,
}

/// Vector index over one collection
///
/// Records live in SQLite, so they survive restarts and `upsert` is a plain
/// overwrite-by-id. Searches run against an HNSW graph (cosine distance)
/// that is rebuilt from the table whenever the record set has changed.
/// Final ranking is by exact distance with ties broken by id, so a fixed
/// index state always yields the same order.
pub struct VectorIndex {
    database: Database,
    collection: String,
    params: HnswParams,
    generation: AtomicU64,
    graph: RwLock<Option<Arc<GraphSnapshot>>>,
}

impl VectorIndex {
    /// Open a collection in an existing database
    pub fn new(database: Database, collection: impl Into<String>, params: HnswParams) -> Self {
        Self {
            database,
            collection: collection.into(),
            params,
            generation: AtomicU64::new(0),
            graph: RwLock::new(None),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Insert or overwrite a single record
    pub fn upsert(&self, record: &IndexRecord) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(record))
    }

    /// Insert or overwrite records in one transaction (last write wins)
    pub fn upsert_batch(&self, records: &[IndexRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let expected = match self.dimension()? {
            Some(dimension) => dimension,
            None => records[0].vector.len(),
        };
        for record in records {
            if record.vector.len() != expected {
                return Err(ScriptRagError::DimensionMismatch {
                    expected,
                    actual: record.vector.len(),
                });
            }
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut conn = self.database.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO embeddings
                    (collection, id, title, document, metadata, vector, dimension, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    title = excluded.title,
                    document = excluded.document,
                    metadata = excluded.metadata,
                    vector = excluded.vector,
                    dimension = excluded.dimension,
                    updated_at = excluded.updated_at",
            )?;

            for record in records {
                let metadata =
                    serde_json::to_string(&record.metadata).map_err(|e| ScriptRagError::Json {
                        source: e,
                        context: format!("Failed to encode metadata for {}", record.id),
                    })?;
                stmt.execute(params![
                    self.collection,
                    record.id,
                    record.metadata.title,
                    record.document,
                    metadata,
                    encode_vector(&record.vector),
                    record.vector.len() as i64,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Nearest neighbours of `vector`, most similar first
    ///
    /// `top_k` larger than the collection returns every record. With a
    /// filter, the whole collection is considered before filtering so up to
    /// `top_k` matching records are still returned.
    pub fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        if top_k == 0 {
            return Err(ScriptRagError::InvalidTopK(top_k));
        }

        let snapshot = self.snapshot()?;
        let total = snapshot.entries.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        if let Some(expected) = snapshot.dimension {
            if vector.len() != expected {
                return Err(ScriptRagError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        // Overfetch so the tie group at the k-th distance can be seen whole
        let wanted = if filter.is_some() {
            total
        } else {
            (top_k * 2).max(top_k + OVERFETCH).min(total)
        };
        let ef_search = self.params.ef_search.max(wanted);

        let mut positions: Vec<usize> = snapshot
            .hnsw
            .search(vector, wanted, ef_search)
            .into_iter()
            .map(|neighbour| neighbour.d_id)
            .filter(|&position| position < total)
            .collect();
        positions.sort_unstable();
        positions.dedup();

        // The graph is approximate; fall back to a full scan when it
        // could not produce enough candidates.
        if positions.len() < wanted {
            positions = (0..total).collect();
        }

        let full_scan = positions.len() == total;
        let mut matches = rank(&snapshot, vector, positions, filter);

        // Records tied with the k-th candidate may lie outside the candidate
        // set, and the lowest ids among them must win.
        if !full_scan && ties_reach_edge(&matches, top_k) {
            matches = rank(&snapshot, vector, (0..total).collect(), filter);
        }
        matches.truncate(top_k);

        Ok(matches)
    }

    /// Records matching `filter`, ordered by id
    pub fn get(&self, filter: &MetadataFilter, include_vectors: bool) -> Result<Vec<StoredRecord>> {
        let conn = self.database.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, document, metadata, vector FROM embeddings
             WHERE collection = ?1 AND (?2 IS NULL OR title = ?2)
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![self.collection, filter.title], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, document, metadata, vector) = row?;
            let metadata = decode_metadata(&id, &metadata)?;
            if !filter.matches(&metadata) {
                continue;
            }
            records.push(StoredRecord {
                id,
                document,
                metadata,
                vector: include_vectors.then(|| decode_vector(&vector)),
            });
        }

        Ok(records)
    }

    /// Delete records by id, returning how many existed
    pub fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.database.get_conn()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM embeddings WHERE collection = ?1 AND id = ?2")?;
            for id in ids {
                deleted += stmt.execute(params![self.collection, id])?;
            }
        }
        tx.commit()?;

        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(deleted)
    }

    /// Remove every record in the collection
    pub fn clear(&self) -> Result<usize> {
        let conn = self.database.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM embeddings WHERE collection = ?1",
            params![self.collection],
        )?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(deleted)
    }

    /// Ids stored for a document title
    pub fn ids_for_title(&self, title: &str) -> Result<Vec<String>> {
        let conn = self.database.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM embeddings WHERE collection = ?1 AND title = ?2 ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![self.collection, title], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Number of records in the collection
    pub fn count(&self) -> Result<usize> {
        let conn = self.database.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE collection = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Vector dimension, fixed by the first record written
    pub fn dimension(&self) -> Result<Option<usize>> {
        let conn = self.database.get_conn()?;
        let dimension: Option<i64> = conn
            .query_row(
                "SELECT dimension FROM embeddings WHERE collection = ?1 LIMIT 1",
                params![self.collection],
                |row| row.get(0),
            )
            .optional()?;
        Ok(dimension.map(|d| d as usize))
    }

    /// Per-title record counts
    pub fn titles(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.database.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT title, COUNT(*) FROM embeddings WHERE collection = ?1
             GROUP BY title ORDER BY title",
        )?;
        let titles = stmt
            .query_map(params![self.collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(titles)
    }

    fn fingerprint(&self) -> Result<Fingerprint> {
        let conn = self.database.get_conn()?;
        let (count, last_update) = conn.query_row(
            "SELECT COUNT(*), COALESCE(MAX(updated_at), 0) FROM embeddings WHERE collection = ?1",
            params![self.collection],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(Fingerprint {
            generation: self.generation.load(Ordering::SeqCst),
            count,
            last_update,
        })
    }

    /// Current search graph, rebuilt if the records changed since the last build
    fn snapshot(&self) -> Result<Arc<GraphSnapshot>> {
        let fingerprint = self.fingerprint()?;

        {
            let graph = self
                .graph
                .read()
                .map_err(|_| ScriptRagError::IndexUnavailable("graph lock poisoned".to_string()))?;
            if let Some(snapshot) = graph.as_ref() {
                if snapshot.fingerprint == fingerprint {
                    return Ok(Arc::clone(snapshot));
                }
            }
        }

        let snapshot = Arc::new(self.build_snapshot(fingerprint)?);
        let mut graph = self
            .graph
            .write()
            .map_err(|_| ScriptRagError::IndexUnavailable("graph lock poisoned".to_string()))?;
        *graph = Some(Arc::clone(&snapshot));

        Ok(snapshot)
    }

    fn build_snapshot(&self, fingerprint: Fingerprint) -> Result<GraphSnapshot> {
        let records = self.get(&MetadataFilter::default(), true)?;
        let entries: Vec<SnapshotEntry> = records
            .into_iter()
            .map(|record| SnapshotEntry {
                id: record.id,
                document: record.document,
                metadata: record.metadata,
                vector: record.vector.unwrap_or_default(),
            })
            .collect();

        let hnsw = Hnsw::<f32, DistCosine>::new(
            self.params.m,
            entries.len().max(1),
            MAX_LAYERS,
            self.params.ef_construction,
            DistCosine,
        );
        for (position, entry) in entries.iter().enumerate() {
            hnsw.insert((&entry.vector, position));
        }

        tracing::debug!(
            "Built HNSW graph for '{}' with {} vectors",
            self.collection,
            entries.len()
        );

        Ok(GraphSnapshot {
            fingerprint,
            dimension: entries.first().map(|entry| entry.vector.len()),
            hnsw,
            entries,
        })
    }
}

/// Score candidate positions and order them by (distance, id)
fn rank(
    snapshot: &GraphSnapshot,
    vector: &[f32],
    positions: Vec<usize>,
    filter: Option<&MetadataFilter>,
) -> Vec<QueryMatch> {
    let mut matches: Vec<QueryMatch> = positions
        .into_iter()
        .map(|position| &snapshot.entries[position])
        .filter(|entry| filter.map_or(true, |f| f.matches(&entry.metadata)))
        .map(|entry| QueryMatch {
            id: entry.id.clone(),
            document: entry.document.clone(),
            metadata: entry.metadata.clone(),
            distance: cosine_distance(vector, &entry.vector),
        })
        .collect();

    matches.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(CmpOrdering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    matches
}

/// True when every candidate past the k-th is tied with it
fn ties_reach_edge(matches: &[QueryMatch], top_k: usize) -> bool {
    match (matches.get(top_k.saturating_sub(1)), matches.last()) {
        (Some(kth), Some(last)) => last.distance <= kth.distance,
        _ => true,
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn decode_metadata(id: &str, raw: &str) -> Result<ChunkMetadata> {
    serde_json::from_str(raw).map_err(|e| ScriptRagError::Json {
        source: e,
        context: format!("Corrupt metadata for record {}", id),
    })
}

/// 1 - cosine similarity; zero vectors are maximally distant
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_index(temp: &TempDir) -> VectorIndex {
        let database = Database::new(&temp.path().join("vectors.sqlite")).unwrap();
        VectorIndex::new(database, "movie_scripts", HnswParams::default())
    }

    fn record(id: &str, title: &str, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            vector,
            document: format!("text of {}", id),
            metadata: ChunkMetadata {
                title: title.to_string(),
                chunk_id: id.to_string(),
            },
        }
    }

    fn unit(dimension: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let temp = TempDir::new().unwrap();
        let index = create_index(&temp);

        assert_eq!(index.count().unwrap(), 0);
        assert!(index.query(&unit(8, 0), 3, None).unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let temp = TempDir::new().unwrap();
        let index = create_index(&temp);

        let mut near = unit(8, 0);
        near[1] = 0.1;

        index
            .upsert_batch(&[
                record("Film_1", "Film", unit(8, 0)),
                record("Film_2", "Film", unit(8, 1)),
                record("Film_3", "Film", near),
            ])
            .unwrap();

        let results = index.query(&unit(8, 0), 2, None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "Film_1");
        assert_eq!(results[1].id, "Film_3");
        assert!(results[0].distance <= results[1].distance);
    }

    #[test]
    fn test_upsert_overwrites_by_id() {
        let temp = TempDir::new().unwrap();
        let index = create_index(&temp);

        index.upsert(&record("Film_1", "Film", unit(4, 0))).unwrap();
        let mut updated = record("Film_1", "Film", unit(4, 2));
        updated.document = "rewritten".to_string();
        index.upsert(&updated).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        let results = index.query(&unit(4, 2), 1, None).unwrap();
        assert_eq!(results[0].document, "rewritten");
        assert!(results[0].distance < 1e-5);
    }

    #[test]
    fn test_top_k_larger_than_index() {
        let temp = TempDir::new().unwrap();
        let index = create_index(&temp);

        index
            .upsert_batch(&[
                record("A_1", "A", unit(4, 0)),
                record("A_2", "A", unit(4, 1)),
            ])
            .unwrap();

        let results = index.query(&unit(4, 0), 50, None).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let temp = TempDir::new().unwrap();
        let index = create_index(&temp);

        index
            .upsert_batch(&[
                record("B_2", "B", unit(4, 1)),
                record("B_1", "B", unit(4, 1)),
                record("B_3", "B", unit(4, 1)),
            ])
            .unwrap();

        let first = index.query(&unit(4, 1), 3, None).unwrap();
        let ids: Vec<&str> = first.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["B_1", "B_2", "B_3"]);

        let second = index.query(&unit(4, 1), 3, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ties_beyond_top_k_resolve_to_lowest_ids() {
        let temp = TempDir::new().unwrap();
        let index = create_index(&temp);

        // Insert in reverse so graph order and id order disagree
        let records: Vec<IndexRecord> = (0..200)
            .rev()
            .map(|i| record(&format!("T_{:03}", i), "T", unit(4, 1)))
            .collect();
        index.upsert_batch(&records).unwrap();

        let ids: Vec<String> = index
            .query(&unit(4, 1), 3, None)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["T_000", "T_001", "T_002"]);
    }

    #[test]
    fn test_closer_record_beats_tied_group() {
        let temp = TempDir::new().unwrap();
        let index = create_index(&temp);

        let mut records: Vec<IndexRecord> = (0..50)
            .map(|i| record(&format!("T_{:03}", i), "T", unit(4, 2)))
            .collect();
        records.push(record("Z_999", "Z", unit(4, 1)));
        index.upsert_batch(&records).unwrap();

        let ids: Vec<String> = index
            .query(&unit(4, 1), 3, None)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["Z_999", "T_000", "T_001"]);
    }

    #[test]
    fn test_filtered_query() {
        let temp = TempDir::new().unwrap();
        let index = create_index(&temp);

        index
            .upsert_batch(&[
                record("Inception_1", "Inception", unit(4, 0)),
                record("Tenet_1", "Tenet", unit(4, 1)),
                record("Tenet_2", "Tenet", unit(4, 2)),
            ])
            .unwrap();

        let filter = MetadataFilter::title("Tenet");
        let results = index.query(&unit(4, 0), 2, Some(&filter)).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|m| m.metadata.title == "Tenet"));
    }

    #[test]
    fn test_get_and_delete() {
        let temp = TempDir::new().unwrap();
        let index = create_index(&temp);

        index
            .upsert_batch(&[
                record("Memento_1", "Memento", unit(4, 0)),
                record("Memento_2", "Memento", unit(4, 1)),
                record("Dunkirk_1", "Dunkirk", unit(4, 2)),
            ])
            .unwrap();

        let memento = index.get(&MetadataFilter::title("Memento"), true).unwrap();
        assert_eq!(memento.len(), 2);
        assert_eq!(memento[0].vector.as_ref().unwrap().len(), 4);

        let deleted = index.delete(&["Memento_2".to_string()]).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(index.ids_for_title("Memento").unwrap(), vec!["Memento_1"]);

        // Deleted records disappear from search
        let results = index.query(&unit(4, 1), 5, None).unwrap();
        assert!(results.iter().all(|m| m.id != "Memento_2"));

        assert_eq!(index.clear().unwrap(), 2);
        assert_eq!(index.dimension().unwrap(), None);
        assert!(index.query(&unit(8, 0), 3, None).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_validation() {
        let temp = TempDir::new().unwrap();
        let index = create_index(&temp);

        index.upsert(&record("X_1", "X", unit(8, 0))).unwrap();
        let result = index.upsert(&record("X_2", "X", unit(4, 0)));
        assert!(matches!(
            result,
            Err(ScriptRagError::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));
        assert!(index.query(&unit(4, 0), 1, None).is_err());
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let index = create_index(&temp);
            index.upsert(&record("Tenet_1", "Tenet", unit(4, 3))).unwrap();
        }

        let index = create_index(&temp);
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.dimension().unwrap(), Some(4));
        let results = index.query(&unit(4, 3), 1, None).unwrap();
        assert_eq!(results[0].id, "Tenet_1");
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let temp = TempDir::new().unwrap();
        let index = create_index(&temp);
        assert!(matches!(
            index.query(&unit(4, 0), 0, None),
            Err(ScriptRagError::InvalidTopK(0))
        ));
    }
}
