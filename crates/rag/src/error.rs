use folio_core::CoreError;
use folio_index::IndexError;
use folio_llm::LlmError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("embedding provider returned status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("failed to decode embedding response: {0}")]
    Decode(String),
    #[error("embedding provider returned {vectors} vectors for {texts} texts")]
    Misaligned { texts: usize, vectors: usize },
}

impl EmbeddingError {
    pub fn status(&self) -> Option<u16> {
        match self {
            EmbeddingError::Upstream { status, .. } => Some(*status),
            EmbeddingError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum RagError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("vector index error: {0}")]
    Index(#[from] IndexError),
    /// The index never finished populating; distinct from an empty result.
    #[error("vector index is not ready: {0}")]
    IndexState(String),
    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),
    #[error("portfolio content error: {0}")]
    Content(#[from] CoreError),
}

impl RagError {
    /// True for failures of an external model provider.
    pub fn is_upstream(&self) -> bool {
        matches!(self, RagError::Embedding(_) | RagError::Generation(_))
    }

    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            RagError::Embedding(err) => err.status(),
            RagError::Generation(err) => err.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
