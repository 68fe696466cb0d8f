use parking_lot::RwLock;

use crate::error::Result;
use crate::metric::{rank, Metric};
use crate::{batch_dimensions, check_dimensions, IndexedVector, RetrievalResult, VectorIndex};

#[derive(Debug, Default)]
struct MemoryState {
    entries: Vec<IndexedVector>,
    dimensions: Option<usize>,
    fingerprint: Option<String>,
}

/// Process-local index. Contents are discarded when the process exits.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    metric: Metric,
    state: RwLock<MemoryState>,
}

impl MemoryIndex {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            state: RwLock::new(MemoryState::default()),
        }
    }
}

fn upsert_into(state: &mut MemoryState, entries: &[IndexedVector]) {
    for entry in entries {
        match state.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry.clone(),
            None => state.entries.push(entry.clone()),
        }
    }
}

impl VectorIndex for MemoryIndex {
    fn upsert(&self, entries: &[IndexedVector]) -> Result<usize> {
        let Some(dims) = batch_dimensions(entries)? else {
            return Ok(0);
        };
        let mut state = self.state.write();
        check_dimensions(state.dimensions, dims)?;
        state.dimensions = Some(dims);
        upsert_into(&mut state, entries);
        Ok(entries.len())
    }

    fn replace_all(&self, entries: &[IndexedVector], fingerprint: &str) -> Result<usize> {
        let dims = batch_dimensions(entries)?;
        let mut fresh = MemoryState {
            dimensions: dims,
            fingerprint: Some(fingerprint.to_string()),
            ..Default::default()
        };
        upsert_into(&mut fresh, entries);
        *self.state.write() = fresh;
        Ok(entries.len())
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let state = self.state.read();
        if k == 0 || state.entries.is_empty() {
            return Ok(Vec::new());
        }
        check_dimensions(state.dimensions, vector.len())?;
        let hits = state
            .entries
            .iter()
            .map(|entry| RetrievalResult {
                id: entry.id.clone(),
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                distance: Some(self.metric.distance(vector, &entry.embedding)),
            })
            .collect();
        Ok(rank(hits, k))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.state.read().entries.len())
    }

    fn fingerprint(&self) -> Result<Option<String>> {
        Ok(self.state.read().fingerprint.clone())
    }

    fn reset(&self) -> Result<()> {
        *self.state.write() = MemoryState::default();
        Ok(())
    }

    fn metric(&self) -> Metric {
        self.metric
    }
}
