pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use config::ServiceConfig;
pub use error::AppError;
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/", get(routes::root))
        .route("/api/health", get(routes::health))
        .route("/api/chat", post(routes::chat))
        .route("/api/chat/history/:conversation_id", get(routes::chat_history))
        .route("/api/voice", post(routes::voice))
        .route("/api/content", get(routes::content))
        .route("/api/projects", get(routes::projects))
        .route("/api/projects/:id", get(routes::project))
        .route("/api/experience", get(routes::experience))
        .route("/api/skills", get(routes::skills))
        .route("/api/blog", get(routes::blog))
        .route("/ws/chat", get(ws::chat_socket))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());
    // A wildcard cannot be listed and cannot carry credentials.
    if origins.iter().any(|origin| origin.trim() == "*") {
        return base.allow_origin(AllowOrigin::any());
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("origin" = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}
