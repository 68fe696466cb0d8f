use std::sync::Arc;

use folio_llm::{AudioClip, ChatBackend, LlmRequest, TextStream, Transcriber};
use futures::stream::{Fuse, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::{RagError, Result};

const MARKER: &str = "NAVIGATE:";

static DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*NAVIGATE:(\S*)").expect("directive pattern"));

#[derive(Debug, Clone, Copy)]
pub struct NavigationTarget {
    pub path: &'static str,
    pub description: &'static str,
}

pub const NAVIGATION_TARGETS: &[NavigationTarget] = &[
    NavigationTarget {
        path: "/projects",
        description: "To show all projects",
    },
    NavigationTarget {
        path: "/projects?category=ai-ml",
        description: "To show ML/AI projects",
    },
    NavigationTarget {
        path: "/projects?category=backend",
        description: "To show backend projects",
    },
    NavigationTarget {
        path: "/experience",
        description: "To show work experience",
    },
    NavigationTarget {
        path: "/blog",
        description: "To show blog posts",
    },
    NavigationTarget {
        path: "/projects/[project-id]",
        description: "To show a specific project",
    },
    NavigationTarget {
        path: "/",
        description: "To go home",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationOutcome {
    pub response_text: String,
    pub navigation_directive: Option<String>,
}

pub fn system_prompt() -> String {
    let mut prompt = String::from(
        "You are an AI assistant for a software engineer's portfolio website. Your role is to:\n\n\
         1. Answer questions about their projects, work experience, and skills using the provided context\n\
         2. Be concise but informative\n\
         3. Highlight relevant achievements and technical details\n\
         4. Navigate users to appropriate pages when asked\n\n\
         When answering:\n\
         - Use the context provided to give accurate information\n\
         - If asked to \"show\", \"navigate to\", or \"take me to\" a page, include a navigation command\n\
         - Be friendly and professional\n\
         - Don't make up information not in the context\n\n\
         Navigation commands (use at most one, when appropriate):\n",
    );
    for target in NAVIGATION_TARGETS {
        prompt.push_str(&format!("- {}: {MARKER}{}\n", target.description, target.path));
    }
    prompt.push_str(
        "\nExample:\n\
         User: \"Show me your ML projects\"\n\
         Response: \"I've worked on several ML projects, including the ones below. NAVIGATE:/projects?category=ai-ml\"\n",
    );
    prompt
}

pub fn user_prompt(query: &str, context: &str) -> String {
    format!(
        "Context from portfolio:\n{context}\n\nUser question: {}\n\n\
         Please answer the question using the context provided. If the user wants to navigate \
         somewhere, include the appropriate {MARKER} command.",
        query.trim()
    )
}

fn build_request(query: &str, context: &str) -> LlmRequest {
    LlmRequest {
        system: Some(system_prompt()),
        user: user_prompt(query, context),
    }
}

/// Splits a `NAVIGATE:<path>` directive out of generated text.
///
/// The first token whose path starts with `/` is the directive. Every
/// `NAVIGATE:` token is removed from the visible text, together with the
/// spaces in front of it, and the result is trimmed. Text without a token is
/// returned verbatim.
pub fn extract_directive(raw: &str) -> GenerationOutcome {
    if !raw.contains(MARKER) {
        return GenerationOutcome {
            response_text: raw.to_string(),
            navigation_directive: None,
        };
    }
    let navigation_directive = DIRECTIVE
        .captures_iter(raw)
        .map(|caps| caps[1].to_string())
        .find(|path| path.starts_with('/'));
    let response_text = DIRECTIVE.replace_all(raw, "").trim().to_string();
    GenerationOutcome {
        response_text,
        navigation_directive,
    }
}

/// Incremental counterpart of [`extract_directive`] for streamed text.
///
/// Holds back trailing whitespace and anything that could still become a
/// `NAVIGATE:` token, so the concatenated output equals the cleaned text of the
/// full response.
#[derive(Debug, Default)]
pub struct DirectiveFilter {
    raw: String,
    pending: String,
    started: bool,
}

impl DirectiveFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) -> String {
        self.raw.push_str(fragment);
        self.pending.push_str(fragment);
        let mut out = String::new();
        loop {
            if let Some(idx) = self.pending.find(MARKER) {
                out.push_str(self.pending[..idx].trim_end_matches([' ', '\t']));
                let after = idx + MARKER.len();
                match self.pending[after..].find(char::is_whitespace) {
                    Some(ws) => {
                        self.pending.drain(..after + ws);
                    }
                    None => {
                        self.pending.drain(..idx);
                        break;
                    }
                }
            } else {
                let emit = holdback_start(&self.pending);
                out.push_str(&self.pending[..emit]);
                self.pending.drain(..emit);
                break;
            }
        }
        self.visible(out)
    }

    /// Releases whatever is still held back once the stream has ended.
    pub fn flush(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        let tail = match rest.find(MARKER) {
            Some(idx) => rest[..idx].trim_end_matches([' ', '\t']),
            None => rest.as_str(),
        };
        let tail = tail.trim_end().to_string();
        self.visible(tail)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn outcome(&self) -> GenerationOutcome {
        extract_directive(&self.raw)
    }

    fn visible(&mut self, out: String) -> String {
        if self.started {
            return out;
        }
        let trimmed = out.trim_start();
        if !trimmed.is_empty() {
            self.started = true;
        }
        trimmed.to_string()
    }
}

// Byte offset up to which `pending` can be released: excludes a trailing
// partial marker and the whitespace in front of it.
fn holdback_start(pending: &str) -> usize {
    let mut end = pending.len();
    for k in (1..MARKER.len()).rev() {
        if pending.ends_with(&MARKER[..k]) {
            end = pending.len() - k;
            break;
        }
    }
    pending[..end].trim_end().len()
}

/// Visible fragments of a streamed answer, in generation order.
pub struct GenerationStream {
    inner: Fuse<TextStream>,
    filter: DirectiveFilter,
}

impl GenerationStream {
    pub fn new(inner: TextStream) -> Self {
        Self {
            inner: inner.fuse(),
            filter: DirectiveFilter::new(),
        }
    }

    pub async fn next_fragment(&mut self) -> Option<Result<String>> {
        loop {
            match self.inner.next().await {
                Some(Ok(text)) => {
                    let visible = self.filter.push(&text);
                    if !visible.is_empty() {
                        return Some(Ok(visible));
                    }
                }
                Some(Err(err)) => return Some(Err(err.into())),
                None => {
                    let tail = self.filter.flush();
                    return if tail.is_empty() { None } else { Some(Ok(tail)) };
                }
            }
        }
    }

    pub fn finish(self) -> GenerationOutcome {
        self.filter.outcome()
    }
}

/// Front door to the hosted models: grounded chat plus speech-to-text.
#[derive(Clone)]
pub struct GenerationGateway {
    chat: Arc<dyn ChatBackend>,
    transcriber: Arc<dyn Transcriber>,
}

impl GenerationGateway {
    pub fn new(chat: Arc<dyn ChatBackend>, transcriber: Arc<dyn Transcriber>) -> Self {
        Self { chat, transcriber }
    }

    pub async fn generate(&self, query: &str, context: &str) -> Result<GenerationOutcome> {
        let response = self.chat.chat(&build_request(query, context)).await?;
        debug!(
            "prompt_tokens" = response.prompt_tokens,
            "completion_tokens" = response.completion_tokens,
            "generated"
        );
        Ok(extract_directive(&response.content))
    }

    pub async fn generate_stream(&self, query: &str, context: &str) -> Result<GenerationStream> {
        let inner = self.chat.chat_stream(&build_request(query, context)).await?;
        Ok(GenerationStream::new(inner))
    }

    /// Empty output means nothing intelligible was said; callers treat that as
    /// "no query" rather than a failure.
    pub async fn transcribe(&self, clip: AudioClip) -> Result<String> {
        if !clip.mime_type.starts_with("audio/") {
            return Err(RagError::InvalidInput(format!(
                "expected an audio content type, got {}",
                clip.mime_type
            )));
        }
        if clip.bytes.is_empty() {
            return Ok(String::new());
        }
        let transcript = self.transcriber.transcribe(clip).await?;
        Ok(transcript.trim().to_string())
    }
}
