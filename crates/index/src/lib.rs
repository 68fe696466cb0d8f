mod error;
mod memory;
mod metric;
mod sqlite;

use folio_core::ChunkMetadata;
use serde::{Deserialize, Serialize};

pub use error::{IndexError, Result};
pub use memory::MemoryIndex;
pub use metric::Metric;
pub use sqlite::SqliteIndex;

pub const DEFAULT_COLLECTION: &str = "portfolio";

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: Option<f32>,
}

/// Nearest-neighbour store over externally computed embeddings.
///
/// Writes are atomic per call: a failed `upsert` or `replace_all` leaves the
/// previous contents untouched.
pub trait VectorIndex: Send + Sync {
    /// Insert or replace entries by id.
    fn upsert(&self, entries: &[IndexedVector]) -> Result<usize>;

    /// Drop everything and store `entries`, tagging the collection with
    /// `fingerprint`.
    fn replace_all(&self, entries: &[IndexedVector], fingerprint: &str) -> Result<usize>;

    /// At most `k` results, closest first. An empty index yields no results.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>>;

    fn count(&self) -> Result<usize>;

    fn fingerprint(&self) -> Result<Option<String>>;

    fn reset(&self) -> Result<()>;

    fn metric(&self) -> Metric;
}

pub(crate) fn batch_dimensions(entries: &[IndexedVector]) -> Result<Option<usize>> {
    let Some(first) = entries.first() else {
        return Ok(None);
    };
    let dims = first.embedding.len();
    if dims == 0 {
        return Err(IndexError::InvalidEmbedding(format!(
            "empty embedding for {}",
            first.id
        )));
    }
    for entry in entries {
        if entry.embedding.len() != dims {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                actual: entry.embedding.len(),
            });
        }
    }
    Ok(Some(dims))
}

pub(crate) fn check_dimensions(stored: Option<usize>, actual: usize) -> Result<()> {
    match stored {
        Some(expected) if expected != actual => {
            Err(IndexError::DimensionMismatch { expected, actual })
        }
        _ => Ok(()),
    }
}
