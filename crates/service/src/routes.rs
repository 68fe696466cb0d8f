use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use bytes::Bytes;
use folio_llm::AudioClip;
use folio_rag::{answer, ContextSource};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub query: String,
    pub response: String,
    pub navigate_to: Option<String>,
    pub context_sources: Vec<ContextSource>,
}

#[derive(Debug, Serialize)]
pub struct VoiceResponse {
    pub transcript: String,
    pub response: String,
    pub navigate_to: Option<String>,
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Portfolio Backend API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let (status, rag) = match state.retriever.status() {
        Ok(report) => (
            "healthy",
            json!({ "status": "ok", "chunks": report.chunks, "reused": report.reused }),
        ),
        Err(reason) => ("degraded", json!({ "status": reason })),
    };
    Json(json!({
        "status": status,
        "services": {
            "rag": rag,
            "llm": { "status": "ok", "provider": state.provider },
        },
    }))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let result = answer(&state.retriever, &state.gateway, &body.query).await?;
    Ok(Json(ChatResponse {
        query: body.query,
        response: result.outcome.response_text,
        navigate_to: result.outcome.navigation_directive,
        context_sources: result.sources,
    }))
}

pub async fn voice(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<VoiceResponse>, AppError> {
    let clip = extract_audio(&mut multipart).await?;
    let transcript = state.gateway.transcribe(clip).await?;
    if transcript.is_empty() {
        return Err(AppError::bad_request("Could not transcribe audio"));
    }
    info!("chars" = transcript.len(), "transcribed voice query");
    let result = answer(&state.retriever, &state.gateway, &transcript).await?;
    Ok(Json(VoiceResponse {
        transcript,
        response: result.outcome.response_text,
        navigate_to: result.outcome.navigation_directive,
    }))
}

async fn extract_audio(multipart: &mut Multipart) -> Result<AudioClip, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(AppError::bad_request)?
    {
        if field.name() != Some("audio") {
            continue;
        }
        let mime_type = field.content_type().unwrap_or_default().to_string();
        if !mime_type.starts_with("audio/") {
            return Err(AppError::bad_request("File must be audio format"));
        }
        let file_name = field.file_name().unwrap_or("audio").to_string();
        let bytes: Bytes = field.bytes().await.map_err(AppError::bad_request)?;
        return Ok(AudioClip {
            bytes,
            file_name,
            mime_type,
        });
    }
    Err(AppError::bad_request("missing audio field"))
}

async fn load_content(state: &AppState) -> Result<Map<String, Value>, AppError> {
    let path = &state.config.portfolio_data_path;
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| AppError::internal(anyhow::anyhow!("reading {}: {err}", path.display())))?;
    match serde_json::from_str::<Value>(&raw).map_err(AppError::internal)? {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::internal(anyhow::anyhow!(
            "{} is not a JSON object",
            path.display()
        ))),
    }
}

fn section(content: &mut Map<String, Value>, key: &str, fallback: Value) -> Value {
    content.remove(key).unwrap_or(fallback)
}

pub async fn content(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    Ok(Json(Value::Object(load_content(&state).await?)))
}

pub async fn projects(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let mut content = load_content(&state).await?;
    Ok(Json(json!({ "projects": section(&mut content, "projects", json!([])) })))
}

pub async fn project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let mut content = load_content(&state).await?;
    let projects = match section(&mut content, "projects", json!([])) {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    projects
        .into_iter()
        .find(|project| project.get("id").and_then(Value::as_str) == Some(project_id.as_str()))
        .map(Json)
        .ok_or_else(|| AppError::not_found("Project not found"))
}

pub async fn experience(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let mut content = load_content(&state).await?;
    Ok(Json(json!({ "experience": section(&mut content, "experience", json!([])) })))
}

pub async fn skills(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let mut content = load_content(&state).await?;
    Ok(Json(json!({ "skills": section(&mut content, "skills", json!({})) })))
}

pub async fn blog(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let mut content = load_content(&state).await?;
    Ok(Json(json!({ "posts": section(&mut content, "blog_posts", json!([])) })))
}

// Conversations are not persisted yet.
pub async fn chat_history(Path(conversation_id): Path<String>) -> Json<Value> {
    Json(json!({
        "conversation_id": conversation_id,
        "messages": [],
    }))
}
