//! extracta-api: HTTP surface over the extracta job engine.
//!
//! Handlers only translate between HTTP and [`JobOrchestrator`]; every state
//! decision is made by the engine.

pub mod config;
pub mod error;
pub mod handlers;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use extracta_jobs::JobOrchestrator;

pub use config::ServerConfig;
pub use error::ApiError;

/// Room for multipart boundaries and form fields on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub config: Arc<ServerConfig>,
    /// Open WebSocket connections.
    pub ws_connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(orchestrator: Arc<JobOrchestrator>, config: ServerConfig) -> Self {
        Self {
            orchestrator,
            config: Arc::new(config),
            ws_connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health_check))
        .route("/upload", post(handlers::upload::upload))
        .route("/jobs", get(handlers::jobs::list_jobs))
        .route("/jobs/:id", get(handlers::jobs::get_job))
        .route(
            "/extract/:id",
            get(handlers::jobs::start_extraction).post(handlers::jobs::start_extraction),
        )
        .route(
            "/transcribe/:id",
            get(handlers::jobs::start_transcription).post(handlers::jobs::start_transcription),
        )
        .route("/ws/:id", get(handlers::ws::job_ws))
        .route("/download/:id", get(handlers::files::download))
        .route("/transcript/:id", get(handlers::files::transcript))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        // The upload handler enforces the exact file limit while streaming.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
