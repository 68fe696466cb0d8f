mod chunk;
mod embedding;
mod error;
mod portfolio;

pub use chunk::{
    build_chunks, Chunk, ChunkKind, ChunkMetadata, Chunker, ChunkingConfig, PERSONAL_CHUNK_ID,
};
pub use embedding::{normalize, HashEmbedder, HashEmbedderConfig};
pub use error::{CoreError, Result};
pub use portfolio::{BlogPost, Experience, Personal, PortfolioDocument, Project};
