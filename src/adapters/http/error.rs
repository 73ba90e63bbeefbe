use crate::error::{ConfigError, RenderError, SubmitError, ValidationError};
use crate::metrics::MetricsError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Seconds a client is asked to wait after a saturation rejection.
pub const RETRY_AFTER_SECS: u64 = 5;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    BadBody(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadBody(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Submit(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Render(RenderError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Render(_) => StatusCode::BAD_GATEWAY,
            ApiError::Config(_) | ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadBody(_) => "bad_body",
            ApiError::Validation(_) => "validation",
            ApiError::Submit(SubmitError::Saturated { .. }) => "saturated",
            ApiError::Submit(SubmitError::FingerprintCollision(_)) => "collision",
            ApiError::Render(e) => e.reason(),
            ApiError::Config(_) => "config",
            ApiError::Metrics(_) => "metrics",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            detail: self.to_string(),
            code: self.code(),
        });

        match self {
            ApiError::Submit(_) => (
                status,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}
