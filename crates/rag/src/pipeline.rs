use serde::Serialize;
use tracing::info;

use crate::context::format_context;
use crate::error::{RagError, Result};
use crate::gateway::{GenerationGateway, GenerationOutcome, GenerationStream};
use crate::retriever::{ContextSource, Retriever};

#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub query: String,
    #[serde(flatten)]
    pub outcome: GenerationOutcome,
    pub sources: Vec<ContextSource>,
    #[serde(skip)]
    pub context: String,
}

/// A streamed answer: the sources are known up front, text arrives through
/// `stream`.
pub struct StreamingAnswer {
    pub query: String,
    pub sources: Vec<ContextSource>,
    pub stream: GenerationStream,
}

fn validate(query: &str) -> Result<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(RagError::InvalidInput("query is empty".to_string()));
    }
    Ok(query)
}

/// Retrieve, format and generate one grounded answer.
pub async fn answer(
    retriever: &Retriever,
    gateway: &GenerationGateway,
    query: &str,
) -> Result<ChatAnswer> {
    let query = validate(query)?;
    let results = retriever.search(query, None).await?;
    let context = format_context(&results);
    let outcome = gateway.generate(query, &context).await?;
    info!(
        "sources" = results.len(),
        "navigate" = outcome.navigation_directive.is_some(),
        "answered chat query"
    );
    Ok(ChatAnswer {
        query: query.to_string(),
        outcome,
        sources: Retriever::sources(&results),
        context,
    })
}

pub async fn answer_stream(
    retriever: &Retriever,
    gateway: &GenerationGateway,
    query: &str,
) -> Result<StreamingAnswer> {
    let query = validate(query)?;
    let results = retriever.search(query, None).await?;
    let context = format_context(&results);
    let stream = gateway.generate_stream(query, &context).await?;
    Ok(StreamingAnswer {
        query: query.to_string(),
        sources: Retriever::sources(&results),
        stream,
    })
}
