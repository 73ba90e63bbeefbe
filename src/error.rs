//! Error taxonomy for the render core.
//!
//! Each concern has its own enum so callers can tell a bad request from a
//! full queue from a failed encode:
//! - [`ValidationError`]: the request itself is wrong, fix it before retrying
//! - [`SubmitError`]: the pool is saturated, retry later
//! - [`RenderError`]: the encode failed, shared by every waiter of the job
//! - [`ConfigError`]: the process is misconfigured, fatal at startup
//! - [`ServeError`]: anything that stops the binary, startup or serving

use crate::metrics::MetricsError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("background identifier must match [A-Za-z0-9_-]{{1,50}}")]
    InvalidImageId,

    #[error("field `{0}` is empty after sanitization")]
    EmptyText(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("render queue is full ({running} running, {queued} queued)")]
    Saturated { running: usize, queued: usize },

    #[error("fingerprint {0} is held by a job with different parameters")]
    FingerprintCollision(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("encoder timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("encoder exited with status {code:?}: {stderr}")]
    EncoderExit { code: Option<i32>, stderr: String },

    #[error("failed to launch encoder: {0}")]
    Spawn(String),

    #[error("background unavailable: {0}")]
    Background(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("job was dropped before completing")]
    Lost,

    /// The encoder binary vanished or lost its permissions after startup.
    /// This is an operator problem, not a failed render.
    #[error("encoder is not runnable: {0}")]
    Config(String),
}

impl RenderError {
    /// Label used for `jobs_failed_total{reason}`.
    pub fn reason(&self) -> &'static str {
        match self {
            RenderError::Timeout(_) => "timeout",
            RenderError::EncoderExit { .. } => "encoder_exit",
            RenderError::Spawn(_) => "spawn",
            RenderError::Background(_) => "background",
            RenderError::Io(_) => "io",
            RenderError::Lost => "lost",
            RenderError::Config(_) => "config",
        }
    }

    /// Config-class outcomes are excluded from `jobs_failed_total`.
    pub fn is_config(&self) -> bool {
        matches!(self, RenderError::Config(_))
    }
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::Io(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ffmpeg binary not found (checked {checked:?} and PATH)")]
    EncoderNotFound { checked: Vec<std::path::PathBuf> },

    #[error("ffmpeg at {path} is not usable: {reason}")]
    EncoderUnusable { path: String, reason: String },

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("i/o error during startup: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("server i/o error: {0}")]
    Io(#[from] std::io::Error),
}
