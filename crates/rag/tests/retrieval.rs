use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use folio_core::{build_chunks, ChunkKind, PortfolioDocument};
use folio_index::{MemoryIndex, Metric, SqliteIndex, VectorIndex, DEFAULT_COLLECTION};
use folio_rag::{
    format_context, Embedder, EmbeddingClient, EmbeddingError, RagError, Retriever, NO_CONTEXT,
};
use tempfile::tempdir;

struct CountingEmbedder {
    inner: EmbeddingClient,
    batches: AtomicUsize,
    fail: AtomicBool,
}

impl CountingEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: EmbeddingClient::hash(),
            batches: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Upstream {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        if texts.len() > 1 {
            self.batches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.inner.embed_batch(texts).await
    }

    fn model_id(&self) -> String {
        self.inner.model_id()
    }
}

fn document() -> Arc<PortfolioDocument> {
    let raw = r#"{
        "personal": {"name": "Sam Lee", "title": "Designer", "bio": "Paints murals downtown."},
        "skills": {"languages": ["Rust", "Haskell"], "tools": ["Figma"]},
        "projects": [{"id": "garden", "title": "Garden Planner", "description": "Plans vegetable beds.",
                      "tech_stack": ["Elm"], "highlights": ["Seasonal calendar"], "category": "web"}],
        "experience": [{"id": "acme", "company": "Acme", "role": "Backend Engineer", "duration": "2020",
                        "description": "Backend experience building backend services.",
                        "responsibilities": [], "achievements": [], "tech_stack": ["Go"]}],
        "blog_posts": [{"id": "b1", "title": "Watercolor Tips", "slug": "watercolor-tips",
                        "excerpt": "Brushes and paper.", "category": "art", "tags": ["paint"]}]
    }"#;
    Arc::new(PortfolioDocument::from_json(raw).unwrap())
}

fn retriever(embedder: Arc<CountingEmbedder>, index: Arc<dyn VectorIndex>) -> Retriever {
    Retriever::new(document(), embedder, index)
}

#[tokio::test]
async fn ensure_indexed_is_idempotent() {
    let embedder = CountingEmbedder::new();
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(Metric::Cosine));
    let retriever = retriever(embedder.clone(), index.clone());

    let first = retriever.ensure_indexed().await.unwrap();
    let second = retriever.ensure_indexed().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.chunks, build_chunks(&document()).len());
    assert_eq!(index.count().unwrap(), first.chunks);
    assert_eq!(embedder.batches(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_population() {
    let embedder = CountingEmbedder::new();
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new(Metric::Cosine));
    let retriever = Arc::new(retriever(embedder.clone(), index));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let retriever = retriever.clone();
            tokio::spawn(async move { retriever.ensure_indexed().await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(embedder.batches(), 1);
}

#[tokio::test]
async fn own_text_ranks_itself_first() {
    let retriever = retriever(
        CountingEmbedder::new(),
        Arc::new(MemoryIndex::new(Metric::Cosine)),
    );
    for chunk in build_chunks(&document()) {
        let hits = retriever.search(&chunk.text, Some(1)).await.unwrap();
        assert_eq!(hits[0].text, chunk.text);
        assert_eq!(hits[0].metadata, chunk.metadata);
    }
}

#[tokio::test]
async fn backend_question_finds_experience() {
    let retriever = retriever(
        CountingEmbedder::new(),
        Arc::new(MemoryIndex::new(Metric::Cosine)),
    );
    let hits = retriever
        .search("Tell me about your backend experience", None)
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].metadata.kind(), ChunkKind::Experience);
    assert_eq!(hits[0].metadata.id(), "acme");

    let context = format_context(&hits);
    assert!(context.starts_with(&format!("[Source 1]:\n{}\n", hits[0].text)));

    let sources = Retriever::sources(&hits);
    assert_eq!(sources[0].kind, ChunkKind::Experience);
    assert_eq!(sources[0].id, "acme");
}

#[tokio::test]
async fn top_k_bounds() {
    let retriever = retriever(
        CountingEmbedder::new(),
        Arc::new(MemoryIndex::new(Metric::Cosine)),
    );
    assert!(retriever.search("rust", Some(0)).await.unwrap().is_empty());
    let all = retriever.search("rust", Some(100)).await.unwrap();
    assert_eq!(all.len(), build_chunks(&document()).len());
    assert!(retriever.search("   ", None).await.unwrap().is_empty());
    assert_eq!(format_context(&[]), NO_CONTEXT);
}

#[tokio::test]
async fn stored_index_is_reused_across_restarts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vectors.sqlite");

    let first = CountingEmbedder::new();
    {
        let index = Arc::new(SqliteIndex::open(&path, DEFAULT_COLLECTION, Metric::Cosine).unwrap());
        let report = retriever(first.clone(), index).ensure_indexed().await.unwrap();
        assert!(!report.reused);
    }
    assert_eq!(first.batches(), 1);

    let second = CountingEmbedder::new();
    let index = Arc::new(SqliteIndex::open(&path, DEFAULT_COLLECTION, Metric::Cosine).unwrap());
    let retriever = retriever(second.clone(), index);
    let report = retriever.ensure_indexed().await.unwrap();
    assert!(report.reused);
    assert_eq!(second.batches(), 0);

    let rebuilt = retriever.rebuild().await.unwrap();
    assert!(!rebuilt.reused);
    assert_eq!(second.batches(), 1);
}

#[tokio::test]
async fn failed_population_is_reported_then_retried() {
    let embedder = CountingEmbedder::new();
    embedder.fail.store(true, Ordering::SeqCst);
    let retriever = retriever(embedder.clone(), Arc::new(MemoryIndex::new(Metric::Cosine)));

    let err = retriever.ensure_indexed().await.unwrap_err();
    assert_eq!(err.upstream_status(), Some(503));
    let err = retriever.search("rust", None).await.unwrap_err();
    assert!(matches!(err, RagError::IndexState(_)));
    assert!(retriever.status().is_err());

    embedder.fail.store(false, Ordering::SeqCst);
    retriever.ensure_indexed().await.unwrap();
    assert!(!retriever.search("rust", None).await.unwrap().is_empty());
}
