use super::{ChunkOutcome, EmbedOutcome};
use serde::Serialize;
use std::fmt;

/// Summary of an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents_chunked: usize,
    pub documents_embedded: usize,
    pub documents_skipped: usize,
    pub chunks_upserted: usize,
    pub stale_chunks_purged: usize,
    pub duration_ms: u64,
}

impl IngestReport {
    pub(super) fn record_chunking(&mut self, outcome: &ChunkOutcome) {
        if outcome.rechunked {
            self.documents_chunked += 1;
        }
    }

    pub(super) fn record_embedding(&mut self, outcome: &EmbedOutcome) {
        if outcome.embedded {
            self.documents_embedded += 1;
            self.chunks_upserted += outcome.chunks_upserted;
            self.stale_chunks_purged += outcome.stale_purged;
        } else {
            self.documents_skipped += 1;
        }
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ingestion complete: {} chunked, {} embedded, {} skipped, {} chunks upserted, {} stale purged, {}ms",
            self.documents_chunked,
            self.documents_embedded,
            self.documents_skipped,
            self.chunks_upserted,
            self.stale_chunks_purged,
            self.duration_ms
        )
    }
}
