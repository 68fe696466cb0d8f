use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use folio_core::PortfolioDocument;
use folio_index::{MemoryIndex, Metric};
use folio_llm::{AudioClip, ChatBackend, LlmRequest, LlmResponse, TextStream, Transcriber};
use folio_rag::{answer, answer_stream, EmbeddingClient, GenerationGateway, RagError, Retriever};
use parking_lot::Mutex;

struct ScriptedChat {
    fragments: Vec<&'static str>,
    seen: Mutex<Vec<LlmRequest>>,
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn chat(&self, req: &LlmRequest) -> folio_llm::Result<LlmResponse> {
        self.seen.lock().push(req.clone());
        Ok(LlmResponse {
            content: self.fragments.concat(),
            prompt_tokens: 10,
            completion_tokens: 5,
        })
    }

    async fn chat_stream(&self, req: &LlmRequest) -> folio_llm::Result<TextStream> {
        self.seen.lock().push(req.clone());
        let fragments: Vec<folio_llm::Result<String>> =
            self.fragments.iter().map(|f| Ok(f.to_string())).collect();
        Ok(Box::pin(futures::stream::iter(fragments)))
    }
}

struct FixedTranscript(&'static str);

#[async_trait]
impl Transcriber for FixedTranscript {
    async fn transcribe(&self, _clip: AudioClip) -> folio_llm::Result<String> {
        Ok(self.0.to_string())
    }
}

fn setup(fragments: Vec<&'static str>) -> (Retriever, GenerationGateway, Arc<ScriptedChat>) {
    let raw = r#"{
        "personal": {"name": "Sam Lee", "title": "Engineer", "bio": "Builds ML systems."},
        "projects": [{"id": "vision", "title": "Vision Pipeline", "description": "Image classifier.",
                      "tech_stack": ["PyTorch"], "highlights": [], "category": "ai-ml"}]
    }"#;
    let document = Arc::new(PortfolioDocument::from_json(raw).unwrap());
    let retriever = Retriever::new(
        document,
        Arc::new(EmbeddingClient::hash()),
        Arc::new(MemoryIndex::new(Metric::Cosine)),
    );
    let chat = Arc::new(ScriptedChat {
        fragments,
        seen: Mutex::new(Vec::new()),
    });
    let gateway = GenerationGateway::new(chat.clone(), Arc::new(FixedTranscript("  show me ML projects ")));
    (retriever, gateway, chat)
}

#[tokio::test]
async fn answer_returns_directive_and_sources() {
    let (retriever, gateway, chat) = setup(vec![
        "Here are my ML projects. ",
        "NAVIGATE:/projects?category=ai-ml",
    ]);
    let result = answer(&retriever, &gateway, "Show me your ML projects").await.unwrap();
    assert_eq!(result.outcome.response_text, "Here are my ML projects.");
    assert_eq!(
        result.outcome.navigation_directive.as_deref(),
        Some("/projects?category=ai-ml")
    );
    assert_eq!(result.sources.len(), 2);
    assert!(result.context.starts_with("[Source 1]:\n"));

    let seen = chat.seen.lock();
    assert!(seen[0].user.contains(&result.context));
    assert!(seen[0].user.contains("User question: Show me your ML projects"));
    assert!(seen[0].system.as_deref().unwrap().contains("NAVIGATE:/blog"));
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let (retriever, gateway, _) = setup(vec!["unused"]);
    let err = answer(&retriever, &gateway, "  ").await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
}

#[tokio::test]
async fn streamed_answer_hides_directive() {
    let (retriever, gateway, _) = setup(vec!["Take a ", "look. NAVI", "GATE:/projects", " Enjoy"]);
    let mut streaming = answer_stream(&retriever, &gateway, "projects").await.unwrap();
    let mut visible = String::new();
    while let Some(fragment) = streaming.stream.next_fragment().await {
        let fragment = fragment.unwrap();
        assert!(!fragment.contains("NAV"));
        visible.push_str(&fragment);
    }
    let outcome = streaming.stream.finish();
    assert_eq!(visible, "Take a look. Enjoy");
    assert_eq!(outcome.response_text, visible);
    assert_eq!(outcome.navigation_directive.as_deref(), Some("/projects"));
}

#[tokio::test]
async fn transcription_validates_and_trims() {
    let (_, gateway, _) = setup(vec![]);
    fn clip(mime: &str, bytes: &'static [u8]) -> AudioClip {
        AudioClip {
            bytes: Bytes::from_static(bytes),
            file_name: "clip.webm".to_string(),
            mime_type: mime.to_string(),
        }
    }
    let err = gateway.transcribe(clip("text/plain", b"abc")).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
    assert_eq!(gateway.transcribe(clip("audio/webm", b"")).await.unwrap(), "");
    assert_eq!(
        gateway.transcribe(clip("audio/webm", b"abc")).await.unwrap(),
        "show me ML projects"
    );
}
