//! Quotereel - render-job admission, deduplication and execution core.
//!
//! Hexagonal Architecture:
//! - domain/: Pure render logic (params, sanitizer, fingerprint, ffmpeg args)
//! - ports/: Trait definitions (encoder process, background source)
//! - adapters/: Concrete implementations (ffmpeg, backgrounds, HTTP)
//! - application/: Admission controller and worker pool
//! - cache, metrics: In-process result cache and metrics registry
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;

// Re-exports for convenience
pub use application::admission::{AdmissionController, AdmissionLimits, QueueStatus, Submission};
pub use application::worker::{RenderWorker, WorkerPool};
pub use cache::TtlLruCache;
pub use config::RenderConfig;
pub use error::{ConfigError, RenderError, ServeError, SubmitError, ValidationError};
pub use metrics::{Metrics, MetricsError};
