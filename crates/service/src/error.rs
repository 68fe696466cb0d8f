use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use folio_rag::RagError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("upstream model provider failed: {source}")]
    Upstream {
        status: Option<u16>,
        #[source]
        source: RagError,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request<E: ToString>(msg: E) -> Self {
        Self::BadRequest(msg.to_string())
    }

    pub fn not_found<E: ToString>(msg: E) -> Self {
        Self::NotFound(msg.to_string())
    }

    pub fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream {
                status: Some(_), ..
            } => StatusCode::BAD_GATEWAY,
            AppError::Upstream { status: None, .. } | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand to clients; internal detail only goes to the log.
    pub fn detail(&self) -> String {
        match self {
            AppError::BadRequest(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::Upstream { .. } => "upstream model provider failed".to_string(),
            AppError::Internal(_) => "internal error".to_string(),
        }
    }

    pub fn log(&self) {
        match self {
            AppError::Upstream { status, source } => {
                error!("upstream_status" = ?status, "error" = %source, "upstream failure");
            }
            AppError::Internal(err) => error!("internal_error" = %err),
            _ => {}
        }
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::InvalidInput(msg) => AppError::BadRequest(msg),
            err if err.is_upstream() => AppError::Upstream {
                status: err.upstream_status(),
                source: err,
            },
            err => AppError::Internal(err.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        (self.status(), Json(json!({ "detail": self.detail() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_llm::LlmError;

    #[test]
    fn maps_rag_errors_to_statuses() {
        let bad: AppError = RagError::InvalidInput("query is empty".to_string()).into();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        assert_eq!(bad.detail(), "query is empty");

        let upstream: AppError = RagError::Generation(LlmError::Upstream {
            status: 503,
            body: "secret detail".to_string(),
        })
        .into();
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
        assert!(!upstream.detail().contains("secret"));

        let state: AppError = RagError::IndexState("pending".to_string()).into();
        assert_eq!(state.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
