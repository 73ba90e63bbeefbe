//! HTTP inbound adapter.
//!
//! Thin axum layer over the admission controller: request parsing, status
//! mapping, metrics exposition and static serving of finished videos.

pub mod error;
pub mod handlers;

use crate::application::admission::AdmissionController;
use crate::ports::encoder::EncoderRunner;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Where rendered files are served from.
pub const VIDEOS_ROUTE: &str = "/videos";

#[derive(Clone)]
pub struct AppState {
    pub controller: AdmissionController,
    /// Used by `/health` to ask the encoder binary for its version.
    pub encoder: Arc<dyn EncoderRunner>,
    pub output_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let videos = ServeDir::new(&state.output_dir);

    Router::new()
        .route("/render", post(handlers::render))
        .route("/render/status", get(handlers::status))
        .route("/metrics", get(handlers::metrics_text))
        .route("/metrics/summary", get(handlers::metrics_summary))
        .route("/health", get(handlers::health))
        .nest_service(VIDEOS_ROUTE, videos)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
