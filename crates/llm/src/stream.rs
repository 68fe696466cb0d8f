use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::{LlmError, Result};

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Delta(String),
    Done,
}

/// Line decoder for OpenAI-style `text/event-stream` chat completions.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = parse_line(line.trim_end_matches(['\r', '\n']))? {
                events.push(event);
            }
        }
        Ok(events)
    }

    pub(crate) fn finish(&mut self) -> Result<Vec<SseEvent>> {
        if self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        parse_line(line.trim()).map(|event| event.into_iter().collect())
    }
}

fn parse_line(line: &str) -> Result<Option<SseEvent>> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }
    let value: Value =
        serde_json::from_str(data).map_err(|err| LlmError::Decode(err.to_string()))?;
    let delta = value
        .pointer("/choices/0/delta/content")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if delta.is_empty() {
        return Ok(None);
    }
    Ok(Some(SseEvent::Delta(delta.to_string())))
}

struct SseState {
    inner: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl SseState {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Delta(text) if !self.finished => self.pending.push_back(text),
                SseEvent::Delta(_) => {}
                SseEvent::Done => self.finished = true,
            }
        }
    }
}

/// Turns a streamed HTTP body into text fragments in arrival order. Dropping
/// the returned stream drops the body and aborts the upstream request.
pub(crate) fn sse_text_stream(response: reqwest::Response) -> TextStream {
    let state = SseState {
        inner: Box::pin(response.bytes_stream()),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };
    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.pending.pop_front() {
                return Some((Ok(text), state));
            }
            if state.finished {
                return None;
            }
            match state.inner.next().await {
                Some(Ok(bytes)) => match state.decoder.push(&bytes) {
                    Ok(events) => state.absorb(events),
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                },
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(LlmError::Transport(err)), state));
                }
                None => {
                    let tail = state.decoder.finish();
                    match tail {
                        Ok(events) => state.absorb(events),
                        Err(err) => {
                            state.finished = true;
                            return Some((Err(err), state));
                        }
                    }
                    state.finished = true;
                }
            }
        }
    });
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_split_frames() {
        let mut decoder = SseDecoder::default();
        let first = decoder
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel")
            .unwrap();
        assert!(first.is_empty());
        let second = decoder
            .push(b"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{}}]}\ndata: [DONE]\n")
            .unwrap();
        assert_eq!(
            second,
            vec![SseEvent::Delta("Hello".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\n\nevent: ping\n").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn rejects_malformed_json() {
        let mut decoder = SseDecoder::default();
        assert!(matches!(
            decoder.push(b"data: {not json}\n"),
            Err(LlmError::Decode(_))
        ));
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: [DONE]").unwrap();
        assert_eq!(decoder.finish().unwrap(), vec![SseEvent::Done]);
    }
}
