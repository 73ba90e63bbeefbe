//! Render metrics registry.
//!
//! One registry is built at startup and handed to the admission controller,
//! the worker pool and the HTTP layer as an `Arc<Metrics>`. Collectors live in
//! a `prometheus::Registry` owned by this struct, never the process-global one.

use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Metric names, kept in one place so tests and dashboards agree.
pub mod names {
    pub const JOBS_SUCCEEDED_TOTAL: &str = "jobs_succeeded_total";
    pub const JOBS_FAILED_TOTAL: &str = "jobs_failed_total";
    pub const JOBS_REJECTED_TOTAL: &str = "jobs_rejected_total";
    pub const JOBS_DEDUPLICATED_TOTAL: &str = "jobs_deduplicated_total";
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const QUEUE_RUNNING: &str = "queue_running";
    pub const QUEUE_WAITING: &str = "queue_waiting";
    pub const ENCODE_TIME_SECONDS: &str = "encode_time_seconds";
}

/// Upper bounds of the encode time buckets, in seconds. `+Inf` is implied.
pub const ENCODE_TIME_BUCKETS: [f64; 7] = [0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    succeeded: IntCounter,
    failed: IntCounterVec,
    rejected: IntCounter,
    deduplicated: IntCounter,
    cache_hits: IntCounter,
    running: IntGauge,
    waiting: IntGauge,
    encode_time: Histogram,
}

/// Derived view for internal dashboards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSummary {
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_rejected: u64,
    pub cache_hits: u64,
    pub deduplicated: u64,
    pub error_rate: f64,
    pub avg_encode_seconds: f64,
    pub running: u64,
    pub waiting: u64,
}

impl Metrics {
    /// Build every collector and register it with a fresh registry.
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();

        let succeeded = IntCounter::new(
            names::JOBS_SUCCEEDED_TOTAL,
            "Renders that completed successfully.",
        )?;
        registry.register(Box::new(succeeded.clone()))?;

        let failed = IntCounterVec::new(
            Opts::new(names::JOBS_FAILED_TOTAL, "Renders that failed, by reason."),
            &["reason"],
        )?;
        registry.register(Box::new(failed.clone()))?;

        let rejected = IntCounter::new(
            names::JOBS_REJECTED_TOTAL,
            "Submissions rejected because the queue was full.",
        )?;
        registry.register(Box::new(rejected.clone()))?;

        let deduplicated = IntCounter::new(
            names::JOBS_DEDUPLICATED_TOTAL,
            "Submissions attached to an in-flight render.",
        )?;
        registry.register(Box::new(deduplicated.clone()))?;

        let cache_hits = IntCounter::new(
            names::CACHE_HITS_TOTAL,
            "Submissions served from the result cache.",
        )?;
        registry.register(Box::new(cache_hits.clone()))?;

        let running = IntGauge::new(
            names::QUEUE_RUNNING,
            "Renders currently occupying a worker slot.",
        )?;
        registry.register(Box::new(running.clone()))?;

        let waiting = IntGauge::new(names::QUEUE_WAITING, "Renders waiting for a worker slot.")?;
        registry.register(Box::new(waiting.clone()))?;

        let encode_time = Histogram::with_opts(
            HistogramOpts::new(
                names::ENCODE_TIME_SECONDS,
                "Wall-clock encoder time of successful renders.",
            )
            .buckets(ENCODE_TIME_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(encode_time.clone()))?;

        Ok(Self {
            registry,
            succeeded,
            failed,
            rejected,
            deduplicated,
            cache_hits,
            running,
            waiting,
            encode_time,
        })
    }

    pub fn record_success(&self, encode_time: Duration) {
        self.succeeded.inc();
        self.encode_time.observe(encode_time.as_secs_f64());
    }

    pub fn record_failure(&self, reason: &'static str) {
        self.failed.with_label_values(&[reason]).inc();
    }

    pub fn record_rejected(&self) {
        self.rejected.inc();
    }

    pub fn record_deduplicated(&self) {
        self.deduplicated.inc();
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.inc();
    }

    pub fn set_queue(&self, running: usize, waiting: usize) {
        self.running.set(running as i64);
        self.waiting.set(waiting as i64);
    }

    pub fn jobs_succeeded(&self) -> u64 {
        self.succeeded.get()
    }

    /// Reads without creating a series for an unseen reason.
    pub fn jobs_failed(&self, reason: &str) -> u64 {
        self.failed_by_reason()
            .into_iter()
            .filter(|(label, _)| label == reason)
            .map(|(_, count)| count)
            .sum()
    }

    /// Failures summed over every reason seen so far.
    fn jobs_failed_total(&self) -> u64 {
        self.failed_by_reason().into_iter().map(|(_, count)| count).sum()
    }

    fn failed_by_reason(&self) -> Vec<(String, u64)> {
        self.failed
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .map(|metric| {
                let reason = metric
                    .get_label()
                    .iter()
                    .find(|pair| pair.get_name() == "reason")
                    .map(|pair| pair.get_value().to_string())
                    .unwrap_or_default();
                (reason, metric.get_counter().get_value() as u64)
            })
            .collect()
    }

    pub fn summary(&self) -> MetricsSummary {
        let succeeded = self.succeeded.get();
        let failed = self.jobs_failed_total();
        let finished = succeeded + failed;
        let encodes = self.encode_time.get_sample_count();

        MetricsSummary {
            jobs_succeeded: succeeded,
            jobs_failed: failed,
            jobs_rejected: self.rejected.get(),
            cache_hits: self.cache_hits.get(),
            deduplicated: self.deduplicated.get(),
            error_rate: if finished == 0 {
                0.0
            } else {
                failed as f64 / finished as f64
            },
            avg_encode_seconds: if encodes == 0 {
                0.0
            } else {
                self.encode_time.get_sample_sum() / encodes as f64
            },
            running: self.running.get().max(0) as u64,
            waiting: self.waiting.get().max(0) as u64,
        }
    }

    /// Prometheus text exposition of the whole registry.
    pub fn render_text(&self) -> MetricsResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
