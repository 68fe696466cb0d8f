pub mod context;
pub mod embedding;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod retriever;

pub use context::{format_context, NO_CONTEXT};
pub use embedding::{
    Embedder, EmbeddingBackend, EmbeddingClient, EmbeddingProviderKind, EmbeddingSettings,
};
pub use error::{EmbeddingError, RagError, Result};
pub use gateway::{
    extract_directive, DirectiveFilter, GenerationGateway, GenerationOutcome, GenerationStream,
    NAVIGATION_TARGETS,
};
pub use pipeline::{answer, answer_stream, ChatAnswer, StreamingAnswer};
pub use retriever::{ContextSource, IndexReport, Retriever, DEFAULT_TOP_K};
