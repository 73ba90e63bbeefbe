use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::application::admission::QueueStatus;
use crate::domain::sanitize::validate;
use crate::domain::{Fingerprint, RenderRequest};
use crate::metrics::MetricsSummary;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub fingerprint: Fingerprint,
    pub video_url: String,
    pub cached: bool,
    pub encode_time_secs: f64,
}

pub async fn render(
    State(state): State<AppState>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> ApiResult<Json<RenderResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::BadBody(e.body_text()))?;
    let params = validate(&request)?;

    let submission = state.controller.submit(params)?;
    let cached = submission.is_cached();
    let video = submission.outcome().await?;

    Ok(Json(RenderResponse {
        fingerprint: video.fingerprint,
        video_url: format!("{}/{}", super::VIDEOS_ROUTE, video.file_name),
        cached,
        encode_time_secs: video.encode_time.as_secs_f64(),
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.controller.status())
}

pub async fn metrics_text(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let text = state.controller.metrics().render_text()?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], text))
}

pub async fn metrics_summary(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.controller.metrics().summary())
}

pub async fn health(State(state): State<AppState>) -> Response {
    let queue = state.controller.status();
    match state.encoder.version().await {
        Ok(version) => Json(json!({
            "status": "ok",
            "encoder": version,
            "running": queue.running,
            "queued": queue.queued,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "encoder health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "detail": e.to_string() })),
            )
                .into_response()
        }
    }
}
