use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use folio_rag::answer_stream;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::AppError;
use crate::routes::ChatRequest;
use crate::state::AppState;

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Chunk {
        content: String,
        done: bool,
    },
    Message {
        content: String,
        navigate_to: Option<String>,
        done: bool,
    },
    Error {
        content: String,
        done: bool,
    },
}

impl Frame {
    fn chunk(content: String) -> Self {
        Frame::Chunk {
            content,
            done: false,
        }
    }

    fn error(err: AppError) -> Self {
        err.log();
        Frame::Error {
            content: err.detail(),
            done: true,
        }
    }
}

/// The peer went away; the session ends without a reply.
struct Disconnected;

pub async fn chat_socket(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("websocket session opened");
    while let Some(message) = socket.recv().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let outcome = match serde_json::from_str::<ChatRequest>(&text) {
            Ok(request) => stream_reply(&mut socket, &state, &request.query).await,
            Err(err) => send(&mut socket, &Frame::error(AppError::bad_request(err))).await,
        };
        if outcome.is_err() {
            break;
        }
    }
    debug!("websocket session closed");
}

async fn stream_reply(
    socket: &mut WebSocket,
    state: &AppState,
    query: &str,
) -> Result<(), Disconnected> {
    let mut streaming = match answer_stream(&state.retriever, &state.gateway, query).await {
        Ok(streaming) => streaming,
        Err(err) => return send(socket, &Frame::error(err.into())).await,
    };
    loop {
        // Dropping `streaming` on disconnect cancels the upstream request.
        let next = tokio::select! {
            next = streaming.stream.next_fragment() => next,
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    info!("client disconnected mid-stream");
                    return Err(Disconnected);
                }
                Some(Ok(_)) => continue,
            },
        };
        match next {
            Some(Ok(fragment)) => send(socket, &Frame::chunk(fragment)).await?,
            Some(Err(err)) => return send(socket, &Frame::error(err.into())).await,
            None => break,
        }
    }
    let outcome = streaming.stream.finish();
    send(
        socket,
        &Frame::Message {
            content: outcome.response_text,
            navigate_to: outcome.navigation_directive,
            done: true,
        },
    )
    .await
}

async fn send(socket: &mut WebSocket, frame: &Frame) -> Result<(), Disconnected> {
    let payload = serde_json::to_string(frame).map_err(|_| Disconnected)?;
    socket
        .send(Message::Text(payload))
        .await
        .map_err(|_| Disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frames_serialize_with_type_tag() {
        let chunk = serde_json::to_value(Frame::chunk("Hello".to_string())).unwrap();
        assert_eq!(chunk, json!({"type": "chunk", "content": "Hello", "done": false}));

        let message = serde_json::to_value(Frame::Message {
            content: "Done.".to_string(),
            navigate_to: Some("/blog".to_string()),
            done: true,
        })
        .unwrap();
        assert_eq!(
            message,
            json!({"type": "message", "content": "Done.", "navigate_to": "/blog", "done": true})
        );

        let error = serde_json::to_value(Frame::error(AppError::bad_request("query is empty")))
            .unwrap();
        assert_eq!(
            error,
            json!({"type": "error", "content": "query is empty", "done": true})
        );
    }
}
