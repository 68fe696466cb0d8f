mod error;
mod stream;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::HeaderValue, multipart, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

pub use error::{LlmError, Result};
pub use stream::TextStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Groq,
    OpenAi,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Groq => "groq",
            LlmProvider::OpenAi => "openai",
            LlmProvider::Local => "local",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "groq" => Some(LlmProvider::Groq),
            "openai" => Some(LlmProvider::OpenAi),
            "local" => Some(LlmProvider::Local),
            _ => None,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::Groq => "https://api.groq.com/openai/v1",
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Local => "",
        }
    }

    fn key_prefix(&self) -> Option<&'static str> {
        match self {
            LlmProvider::Groq => Some("gsk_"),
            LlmProvider::OpenAi => Some("sk-"),
            LlmProvider::Local => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub transcription_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Groq,
            api_key: None,
            base_url: None,
            model: "llama-3.3-70b-versatile".to_string(),
            transcription_model: "whisper-large-v3".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Bytes,
    pub file_name: String,
    pub mime_type: String,
}

/// Chat-completion capability used by the generation gateway.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse>;

    /// Text fragments in generation order.
    async fn chat_stream(&self, req: &LlmRequest) -> Result<TextStream>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, clip: AudioClip) -> Result<String>;
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    settings: LlmSettings,
    remote: Option<RemoteConfig>,
}

#[derive(Clone)]
struct RemoteConfig {
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let remote = match settings.provider {
            LlmProvider::Local => None,
            provider => {
                let api_key = settings
                    .api_key
                    .clone()
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| {
                        LlmError::Config(format!("an api key is required for {}", provider.as_str()))
                    })?;
                if let Some(prefix) = provider.key_prefix() {
                    if !api_key.starts_with(prefix) {
                        warn!("provider" = provider.as_str(), "api key does not start with {prefix}");
                    }
                }
                Some(RemoteConfig {
                    api_key,
                    base_url: settings
                        .base_url
                        .clone()
                        .unwrap_or_else(|| provider.default_base_url().to_string()),
                })
            }
        };
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            settings,
            remote,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.settings.provider
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn messages(req: &LlmRequest) -> Vec<Value> {
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));
        messages
    }

    fn completion_payload(&self, req: &LlmRequest, stream: bool) -> Value {
        json!({
            "model": self.settings.model,
            "messages": Self::messages(req),
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
            "stream": stream,
        })
    }

    async fn post_with_retry(
        &self,
        cfg: &RemoteConfig,
        payload: &Value,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
        let max_retries = self.settings.max_retries;
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let mut request = self.http.post(&url).bearer_auth(&cfg.api_key).json(payload);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            let response = match request.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt > max_retries || err.is_timeout() {
                        return Err(LlmError::Transport(err));
                    }
                    sleep(backoff_delay(attempt, None)).await;
                    continue;
                }
            };
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt > max_retries {
                    return Err(LlmError::RateLimited(max_retries));
                }
                let wait = backoff_delay(attempt, response.headers().get("retry-after"));
                debug!("attempt" = attempt, "wait_ms" = wait.as_millis() as u64, "rate limited");
                sleep(wait).await;
                continue;
            }
            return ensure_success(response).await;
        }
    }

    fn remote(&self, operation: &'static str) -> Result<&RemoteConfig> {
        self.remote.as_ref().ok_or(LlmError::Unsupported {
            operation,
            provider: self.settings.provider.as_str(),
        })
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse> {
        if self.settings.provider == LlmProvider::Local {
            return Ok(LlmResponse {
                content: synthesize_local_response(req),
                prompt_tokens: 0,
                completion_tokens: 0,
            });
        }
        let cfg = self.remote("chat")?;
        let payload = self.completion_payload(req, false);
        let response = self
            .post_with_retry(cfg, &payload, Some(self.settings.timeout))
            .await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Decode(err.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Decode("missing message content".to_string()))?;
        let usage = parsed.usage.unwrap_or_default();
        Ok(LlmResponse {
            content,
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
        })
    }

    async fn chat_stream(&self, req: &LlmRequest) -> Result<TextStream> {
        if self.settings.provider == LlmProvider::Local {
            let words: Vec<Result<String>> = synthesize_local_response(req)
                .split_inclusive(' ')
                .map(|word| Ok(word.to_string()))
                .collect();
            return Ok(Box::pin(futures::stream::iter(words)));
        }
        let cfg = self.remote("chat streaming")?;
        let payload = self.completion_payload(req, true);
        let response = self.post_with_retry(cfg, &payload, None).await?;
        Ok(stream::sse_text_stream(response))
    }
}

#[async_trait]
impl Transcriber for LlmClient {
    async fn transcribe(&self, clip: AudioClip) -> Result<String> {
        let cfg = self.remote("transcription")?;
        let url = format!(
            "{}/audio/transcriptions",
            cfg.base_url.trim_end_matches('/')
        );
        let part = multipart::Part::bytes(clip.bytes.to_vec())
            .file_name(clip.file_name)
            .mime_str(&clip.mime_type)?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("model", self.settings.transcription_model.clone())
            .text("response_format", "text");
        let response = self
            .http
            .post(url)
            .bearer_auth(&cfg.api_key)
            .multipart(form)
            .timeout(self.settings.timeout)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.text().await?.trim().to_string())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Upstream {
        status: status.as_u16(),
        body,
    })
}

fn backoff_delay(attempt: usize, retry_after: Option<&HeaderValue>) -> Duration {
    if let Some(value) = retry_after {
        if let Ok(text) = value.to_str() {
            if let Ok(secs) = text.parse::<u64>() {
                return Duration::from_secs(secs.clamp(1, 30));
            }
        }
    }
    let capped = attempt.min(4) as u32;
    Duration::from_millis(250u64 << capped)
}

/// Offline stand-in used when no provider is configured: replays the start of
/// the grounding context.
fn synthesize_local_response(req: &LlmRequest) -> String {
    let context = extract_context_block(&req.user, "Context from portfolio:", "User question:");
    let summary = summarize_text(&context, 40);
    if summary.is_empty() {
        return "I could not find anything about that in the portfolio.".to_string();
    }
    format!("Here is what I found: {summary}")
}

fn extract_context_block(text: &str, start_marker: &str, stop_marker: &str) -> String {
    if let Some(start_idx) = text.find(start_marker) {
        let after = &text[start_idx + start_marker.len()..];
        if let Some(end_idx) = after.find(stop_marker) {
            return after[..end_idx].trim().to_string();
        }
        return after.trim().to_string();
    }
    text.trim().to_string()
}

fn summarize_text(text: &str, max_words: usize) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with("[Source"))
        .flat_map(|line| line.split_whitespace())
        .take(max_words)
        .collect::<Vec<&str>>()
        .join(" ")
}

#[derive(Default, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn local() -> LlmClient {
        LlmClient::new(LlmSettings {
            provider: LlmProvider::Local,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn remote_provider_requires_key() {
        let err = LlmClient::new(LlmSettings::default()).err().unwrap();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn provider_names_roundtrip() {
        for provider in [LlmProvider::Groq, LlmProvider::OpenAi, LlmProvider::Local] {
            assert_eq!(LlmProvider::from_str(provider.as_str()), Some(provider));
        }
        assert_eq!(LlmProvider::from_str("gemini"), None);
    }

    #[test]
    fn backoff_honours_retry_after() {
        let header = HeaderValue::from_static("3");
        assert_eq!(backoff_delay(1, Some(&header)), Duration::from_secs(3));
        assert_eq!(backoff_delay(1, None), Duration::from_millis(500));
        assert_eq!(backoff_delay(9, None), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn local_chat_replays_context() {
        let req = LlmRequest {
            system: None,
            user: "Context from portfolio:\n[Source 1]:\nRust services\n\nUser question: hi"
                .to_string(),
        };
        let response = local().chat(&req).await.unwrap();
        assert_eq!(response.content, "Here is what I found: Rust services");
    }

    #[tokio::test]
    async fn local_stream_concatenates_to_chat() {
        let req = LlmRequest {
            system: None,
            user: "Context from portfolio:\nOne two three\nUser question: q".to_string(),
        };
        let client = local();
        let full = client.chat(&req).await.unwrap().content;
        let fragments: Vec<String> = client
            .chat_stream(&req)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), full);
    }

    #[tokio::test]
    async fn local_cannot_transcribe() {
        let clip = AudioClip {
            bytes: Bytes::from_static(b"RIFF"),
            file_name: "a.wav".to_string(),
            mime_type: "audio/wav".to_string(),
        };
        let err = local().transcribe(clip).await.unwrap_err();
        assert!(matches!(err, LlmError::Unsupported { .. }));
    }
}
