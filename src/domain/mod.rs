//! Domain layer - Pure render logic, no I/O.

pub mod encode;
pub mod fingerprint;
pub mod jobs;
pub mod params;
pub mod sanitize;

pub use fingerprint::Fingerprint;
pub use jobs::{Job, JobOutcome, JobState, RenderTask, RenderedVideo};
pub use params::{JobParams, RenderRequest, Style, Template};
