use std::sync::Arc;

use anyhow::{Context, Result};
use folio_core::{Chunker, PortfolioDocument};
use folio_index::{MemoryIndex, SqliteIndex, VectorIndex};
use folio_llm::LlmClient;
use folio_rag::{Embedder, EmbeddingClient, GenerationGateway, Retriever};
use tracing::info;

use crate::config::{ServiceConfig, VectorStoreKind};

/// Shared by every request handler and WebSocket session.
pub struct AppState {
    pub config: ServiceConfig,
    pub retriever: Retriever,
    pub gateway: GenerationGateway,
    pub provider: &'static str,
}

impl AppState {
    pub fn from_config(config: ServiceConfig) -> Result<Self> {
        let document = PortfolioDocument::from_path(&config.portfolio_data_path).with_context(|| {
            format!(
                "failed to load portfolio from {}",
                config.portfolio_data_path.display()
            )
        })?;
        let embedder: Arc<dyn Embedder> =
            Arc::new(EmbeddingClient::new(&config.embedding_settings()?)?);
        let index = open_index(&config)?;
        let llm = Arc::new(LlmClient::new(config.llm_settings()?)?);
        let provider = llm.provider().as_str();
        let gateway = GenerationGateway::new(llm.clone(), llm);
        Ok(Self::new(config, Arc::new(document), embedder, index, gateway, provider))
    }

    pub fn new(
        config: ServiceConfig,
        document: Arc<PortfolioDocument>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        gateway: GenerationGateway,
        provider: &'static str,
    ) -> Self {
        let retriever = Retriever::new(document, embedder, index)
            .with_chunker(Chunker::new(config.chunking()))
            .with_default_top_k(config.top_k_results);
        Self {
            config,
            retriever,
            gateway,
            provider,
        }
    }
}

fn open_index(config: &ServiceConfig) -> Result<Arc<dyn VectorIndex>> {
    let metric = config.metric()?;
    let index: Arc<dyn VectorIndex> = match config.vector_store {
        VectorStoreKind::Memory => Arc::new(MemoryIndex::new(metric)),
        VectorStoreKind::Sqlite => {
            if let Some(parent) = config.vector_store_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create {}", parent.display())
                    })?;
                }
            }
            Arc::new(
                SqliteIndex::open(&config.vector_store_path, &config.collection, metric)
                    .with_context(|| {
                        format!(
                            "failed to open vector store {}",
                            config.vector_store_path.display()
                        )
                    })?,
            )
        }
    };
    info!(
        "store" = ?config.vector_store,
        "collection" = %config.collection,
        "metric" = %metric,
        "vector index ready"
    );
    Ok(index)
}
