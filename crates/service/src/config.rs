use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use folio_core::ChunkingConfig;
use folio_index::Metric;
use folio_llm::{LlmProvider, LlmSettings};
use folio_rag::{EmbeddingProviderKind, EmbeddingSettings};
use serde::Deserialize;

pub const CONFIG_ENV: &str = "FOLIO_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "folio.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub portfolio_data_path: PathBuf,
    pub vector_store: VectorStoreKind,
    pub vector_store_path: PathBuf,
    pub collection: String,
    pub metric: String,
    pub top_k_results: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub stt_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let chunking = ChunkingConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://localhost:4321".to_string(),
            ],
            portfolio_data_path: PathBuf::from("data/portfolio.json"),
            vector_store: VectorStoreKind::Sqlite,
            vector_store_path: PathBuf::from("data/vector_store.sqlite"),
            collection: folio_index::DEFAULT_COLLECTION.to_string(),
            metric: Metric::Cosine.to_string(),
            top_k_results: folio_rag::DEFAULT_TOP_K,
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
            llm: LlmSection::default(),
            embedding: EmbeddingSection::default(),
        }
    }
}

impl Default for LlmSection {
    fn default() -> Self {
        let settings = LlmSettings::default();
        Self {
            provider: settings.provider.as_str().to_string(),
            api_key: None,
            base_url: None,
            model: settings.model,
            stt_model: settings.transcription_model,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout_secs: settings.timeout.as_secs(),
            max_retries: settings.max_retries,
        }
    }
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        let settings = EmbeddingSettings::default();
        Self {
            provider: "hash".to_string(),
            model: settings.model,
            api_key: None,
            base_url: None,
            dimensions: settings.hash_dimensions,
            timeout_secs: settings.timeout.as_secs(),
        }
    }
}

impl ServiceConfig {
    /// Reads the TOML file (explicit path, then `FOLIO_CONFIG`, then
    /// `folio.toml` when present) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path =
                    PathBuf::from(env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()));
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(value) = var("HOST") {
            self.host = value;
        }
        if let Some(port) = var("PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(value) = var("CORS_ORIGINS") {
            self.cors_origins = split_list(&value);
        }
        if let Some(value) = var("PORTFOLIO_DATA_PATH") {
            self.portfolio_data_path = PathBuf::from(value);
        }
        if let Some(value) = var("VECTOR_STORE_PATH") {
            self.vector_store_path = PathBuf::from(value);
        }
        if let Some(value) = var("VECTOR_STORE") {
            match value.trim().to_lowercase().as_str() {
                "memory" => self.vector_store = VectorStoreKind::Memory,
                "sqlite" => self.vector_store = VectorStoreKind::Sqlite,
                _ => {}
            }
        }
        if let Some(value) = var("VECTOR_METRIC") {
            self.metric = value;
        }
        if let Some(top_k) = var("TOP_K_RESULTS").and_then(|v| v.parse().ok()) {
            self.top_k_results = top_k;
        }
        if let Some(size) = var("CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.chunk_size = size;
        }
        if let Some(overlap) = var("CHUNK_OVERLAP").and_then(|v| v.parse().ok()) {
            self.chunk_overlap = overlap;
        }

        if let Some(value) = var("LLM_PROVIDER") {
            self.llm.provider = value;
        }
        if let Some(value) = var("GROQ_API_KEY").or_else(|| var("LLM_API_KEY")) {
            self.llm.api_key = Some(value);
        }
        if let Some(value) = var("LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = var("LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = var("STT_MODEL") {
            self.llm.stt_model = value;
        }

        if let Some(value) = var("EMBEDDING_PROVIDER") {
            self.embedding.provider = value;
        }
        if let Some(value) = var("EMBEDDING_MODEL") {
            self.embedding.model = value;
        }
        if let Some(value) = var("EMBEDDING_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.embedding.api_key = Some(value);
        }
        if let Some(value) = var("EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(value);
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn metric(&self) -> Result<Metric> {
        Ok(self.metric.parse::<Metric>()?)
    }

    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }

    pub fn llm_settings(&self) -> Result<LlmSettings> {
        let provider = LlmProvider::from_str(&self.llm.provider)
            .ok_or_else(|| anyhow!("unknown llm provider {}", self.llm.provider))?;
        Ok(LlmSettings {
            provider,
            api_key: self.llm.api_key.clone(),
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
            transcription_model: self.llm.stt_model.clone(),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            timeout: Duration::from_secs(self.llm.timeout_secs),
            max_retries: self.llm.max_retries,
        })
    }

    pub fn embedding_settings(&self) -> Result<EmbeddingSettings> {
        let provider = EmbeddingProviderKind::from_str(&self.embedding.provider)
            .ok_or_else(|| anyhow!("unknown embedding provider {}", self.embedding.provider))?;
        let defaults = EmbeddingSettings::default();
        Ok(EmbeddingSettings {
            provider,
            model: self.embedding.model.clone(),
            api_key: self.embedding.api_key.clone(),
            base_url: self.embedding.base_url.clone().unwrap_or(defaults.base_url),
            hash_dimensions: self.embedding.dimensions,
            timeout: Duration::from_secs(self.embedding.timeout_secs),
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.top_k_results, 3);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
        assert_eq!(config.llm.stt_model, "whisper-large-v3");
        assert_eq!(config.metric().unwrap(), Metric::Cosine);
    }

    #[test]
    fn toml_sections_are_partial() {
        let config: ServiceConfig = toml::from_str(
            r#"
            port = 9000
            vector_store = "memory"

            [llm]
            provider = "local"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.vector_store, VectorStoreKind::Memory);
        assert_eq!(config.llm_settings().unwrap().provider, LlmProvider::Local);
        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn environment_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("GROQ_API_KEY", "gsk_test"),
            ("TOP_K_RESULTS", "5"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("EMBEDDING_PROVIDER", "openai"),
            ("CHUNK_SIZE", "not-a-number"),
            ("LLM_MODEL", ""),
        ]
        .into_iter()
        .collect();
        let mut config = ServiceConfig::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.llm.api_key.as_deref(), Some("gsk_test"));
        assert_eq!(config.top_k_results, 5);
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(
            config.embedding_settings().unwrap().provider,
            EmbeddingProviderKind::OpenAi
        );
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let mut config = ServiceConfig::default();
        config.llm.provider = "mystery".to_string();
        assert!(config.llm_settings().is_err());
    }
}
