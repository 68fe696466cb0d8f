use std::time::Duration;

use async_trait::async_trait;
use folio_core::{HashEmbedder, HashEmbedderConfig};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::EmbeddingError;

type Result<T> = std::result::Result<T, EmbeddingError>;

/// Maps texts to fixed-length vectors. Output is aligned with the input: one
/// vector per text, same order, or an error for the whole batch.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut output = self.embed_batch(&[text.to_string()]).await?;
        match output.pop() {
            Some(vector) if output.is_empty() => Ok(vector),
            _ => Err(EmbeddingError::Misaligned {
                texts: 1,
                vectors: output.len() + 1,
            }),
        }
    }

    /// Identifies the model, so an index built with another model is rebuilt.
    fn model_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    Hash,
    OpenAi,
}

impl EmbeddingProviderKind {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "hash" | "local" => Some(EmbeddingProviderKind::Hash),
            "openai" | "remote" => Some(EmbeddingProviderKind::OpenAi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub hash_dimensions: usize,
    pub timeout: Duration,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Hash,
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            hash_dimensions: HashEmbedderConfig::default().dimensions,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub enum EmbeddingBackend {
    Hash(HashEmbedder),
    OpenAi(OpenAiEmbeddingClient),
}

/// Process-wide embedding provider, built once at startup.
#[derive(Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

impl EmbeddingClient {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let backend = match settings.provider {
            EmbeddingProviderKind::OpenAi => {
                EmbeddingBackend::OpenAi(OpenAiEmbeddingClient::new(settings)?)
            }
            EmbeddingProviderKind::Hash => {
                EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig {
                    dimensions: settings.hash_dimensions,
                    ..Default::default()
                }))
            }
        };
        Ok(Self { backend })
    }

    pub fn hash() -> Self {
        Self {
            backend: EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig::default())),
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => {
                Ok(texts.iter().map(|text| embedder.embed_text(text)).collect())
            }
            EmbeddingBackend::OpenAi(client) => client.embed_batch(texts).await,
        }
    }

    fn model_id(&self) -> String {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => {
                format!("hash-blake3:{}:{}", embedder.dimensions(), embedder.seed())
            }
            EmbeddingBackend::OpenAi(client) => format!("openai:{}", client.model),
        }
    }
}

/// OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    http: Client,
    url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiEmbeddingClient {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                EmbeddingError::Config("an api key is required for remote embeddings".to_string())
            })?;
        Ok(Self {
            http: Client::new(),
            url: format!("{}/embeddings", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key,
            timeout: settings.timeout,
        })
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let payload = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::Decode(err.to_string()))?;
        debug!("model" = %self.model, "inputs" = inputs.len(), "embedded");
        align_embeddings(parsed.data, inputs.len())
    }
}

fn align_embeddings(mut data: Vec<OpenAiEmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(EmbeddingError::Misaligned {
            texts: expected,
            vectors: data.len(),
        });
    }
    data.sort_by_key(|item| item.index);
    let in_order = data.iter().enumerate().all(|(pos, item)| item.index == pos);
    if !in_order {
        return Err(EmbeddingError::Decode(
            "embedding indices do not cover the request".to_string(),
        ));
    }
    Ok(data.into_iter().map(|item| item.embedding).collect())
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: usize, value: f32) -> OpenAiEmbeddingData {
        OpenAiEmbeddingData {
            index,
            embedding: vec![value],
        }
    }

    #[test]
    fn aligns_out_of_order_results() {
        let aligned = align_embeddings(vec![item(1, 1.0), item(0, 0.0)], 2).unwrap();
        assert_eq!(aligned, vec![vec![0.0], vec![1.0]]);
    }

    #[test]
    fn short_batch_fails_whole_batch() {
        let err = align_embeddings(vec![item(0, 0.0)], 2).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::Misaligned {
                texts: 2,
                vectors: 1
            }
        ));
    }

    #[test]
    fn duplicate_indices_are_rejected() {
        let err = align_embeddings(vec![item(0, 0.0), item(0, 1.0)], 2).unwrap_err();
        assert!(matches!(err, EmbeddingError::Decode(_)));
    }

    #[test]
    fn remote_requires_key() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProviderKind::OpenAi,
            ..Default::default()
        };
        assert!(matches!(
            EmbeddingClient::new(&settings).err(),
            Some(EmbeddingError::Config(_))
        ));
    }

    #[tokio::test]
    async fn single_text_is_batch_of_one() {
        let client = EmbeddingClient::hash();
        let single = client.embed("backend services").await.unwrap();
        let batch = client
            .embed_batch(&["backend services".to_string()])
            .await
            .unwrap();
        assert_eq!(vec![single], batch);
        assert_eq!(client.model_id(), "hash-blake3:384:1337");
    }
}
