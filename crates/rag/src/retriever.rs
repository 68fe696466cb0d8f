use std::sync::Arc;

use folio_core::{ChunkKind, Chunker, PortfolioDocument};
use folio_index::{IndexedVector, RetrievalResult, VectorIndex};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::embedding::Embedder;
use crate::error::{EmbeddingError, RagError, Result};

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub chunks: usize,
    /// The stored collection matched the document and was adopted as is.
    pub reused: bool,
    pub fingerprint: String,
}

/// Provenance of one retrieved chunk, as reported to chat clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSource {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    pub id: String,
}

#[derive(Debug, Clone)]
enum Population {
    Pending,
    Ready(IndexReport),
    Failed(String),
}

/// Chunk, embed and index the portfolio once; answer similarity queries.
pub struct Retriever {
    document: Arc<PortfolioDocument>,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    default_top_k: usize,
    gate: Mutex<()>,
    state: RwLock<Population>,
}

impl Retriever {
    pub fn new(
        document: Arc<PortfolioDocument>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            document,
            chunker: Chunker::default(),
            embedder,
            index,
            default_top_k: DEFAULT_TOP_K,
            gate: Mutex::new(()),
            state: RwLock::new(Population::Pending),
        }
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    pub fn document(&self) -> &PortfolioDocument {
        &self.document
    }

    /// Populates the index unless this process already did, or the stored
    /// collection was built from the same document and embedding model.
    ///
    /// Concurrent callers wait for the first one; only one population pass
    /// runs. A failed pass is recorded and retried by the next call.
    pub async fn ensure_indexed(&self) -> Result<IndexReport> {
        if let Some(report) = self.ready_report() {
            return Ok(report);
        }
        let _gate = self.gate.lock().await;
        if let Some(report) = self.ready_report() {
            return Ok(report);
        }
        let result = self.populate(false).await;
        self.record(&result);
        result
    }

    /// Re-chunks and re-embeds regardless of the stored fingerprint.
    pub async fn rebuild(&self) -> Result<IndexReport> {
        let _gate = self.gate.lock().await;
        let result = self.populate(true).await;
        self.record(&result);
        result
    }

    pub fn status(&self) -> std::result::Result<IndexReport, String> {
        match &*self.state.read() {
            Population::Ready(report) => Ok(report.clone()),
            Population::Pending => Err("pending".to_string()),
            Population::Failed(reason) => Err(reason.clone()),
        }
    }

    /// Closest chunks for `query`, at most `top_k` (configured default when
    /// `None`). An empty or unmatched query yields no results.
    pub async fn search(&self, query: &str, top_k: Option<usize>) -> Result<Vec<RetrievalResult>> {
        self.ensure_searchable().await?;
        let k = top_k.unwrap_or(self.default_top_k);
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).await?;
        Ok(self.index.query(&vector, k)?)
    }

    pub fn sources(results: &[RetrievalResult]) -> Vec<ContextSource> {
        results
            .iter()
            .map(|result| ContextSource {
                kind: result.metadata.kind(),
                id: result.metadata.id().to_string(),
            })
            .collect()
    }

    async fn ensure_searchable(&self) -> Result<()> {
        let state = self.state.read().clone();
        match state {
            Population::Ready(_) => Ok(()),
            Population::Pending => self.ensure_indexed().await.map(|_| ()),
            Population::Failed(reason) => Err(RagError::IndexState(reason)),
        }
    }

    fn ready_report(&self) -> Option<IndexReport> {
        match &*self.state.read() {
            Population::Ready(report) => Some(report.clone()),
            _ => None,
        }
    }

    fn record(&self, result: &Result<IndexReport>) {
        let next = match result {
            Ok(report) => Population::Ready(report.clone()),
            Err(err) => {
                warn!("error" = %err, "index population failed");
                Population::Failed(err.to_string())
            }
        };
        *self.state.write() = next;
    }

    fn fingerprint(&self) -> Result<String> {
        Ok(format!(
            "{}|{}|{}",
            self.document.fingerprint()?,
            self.embedder.model_id(),
            self.index.metric()
        ))
    }

    async fn populate(&self, force: bool) -> Result<IndexReport> {
        let fingerprint = self.fingerprint()?;
        if !force && self.index.fingerprint()?.as_deref() == Some(fingerprint.as_str()) {
            let chunks = self.index.count()?;
            if chunks > 0 {
                info!("chunks" = chunks, "reusing stored index");
                return Ok(IndexReport {
                    chunks,
                    reused: true,
                    fingerprint,
                });
            }
        }

        let chunks = self.chunker.chunk_document(&self.document);
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Misaligned {
                texts: texts.len(),
                vectors: vectors.len(),
            }
            .into());
        }
        let entries: Vec<IndexedVector> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(ordinal, (chunk, embedding))| IndexedVector {
                id: chunk.index_id(ordinal),
                embedding,
                metadata: chunk.metadata,
                text: chunk.text,
            })
            .collect();
        let written = self.index.replace_all(&entries, &fingerprint)?;
        info!("chunks" = written, "indexed portfolio content");
        Ok(IndexReport {
            chunks: written,
            reused: false,
            fingerprint,
        })
    }
}
