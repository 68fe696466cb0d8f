use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("metadata json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),
    #[error("embedding dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("collection {collection} uses metric {stored}, refusing to open it with {requested}")]
    MetricMismatch {
        collection: String,
        stored: String,
        requested: String,
    },
    #[error("unknown distance metric {0}")]
    UnknownMetric(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
