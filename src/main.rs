//! Quotereel server binary.
//!
//! Wires up:
//! - the ffmpeg runner (located and version-checked at startup)
//! - the background source (local directory or URL template)
//! - admission controller, result cache, metrics and worker pool
//! - the HTTP layer

use quotereel::adapters::backgrounds::{Backgrounds, LocalBackgrounds, RemoteBackgrounds};
use quotereel::adapters::ffmpeg::{locate_ffmpeg, FfmpegRunner};
use quotereel::adapters::http::{self, AppState};
use quotereel::{
    AdmissionController, ConfigError, Metrics, RenderConfig, RenderWorker, ServeError,
    TtlLruCache, WorkerPool,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // `.env` may carry RUST_LOG, so it is loaded before the subscriber.
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "quotereel stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ServeError> {
    let config = RenderConfig::from_env()?;

    // 1. Encoder
    let binary = locate_ffmpeg(config.ffmpeg_path.as_deref())?;
    let runner = FfmpegRunner::new(binary);
    let version = runner.check_version().await?;
    info!(binary = %runner.binary().display(), %version, "encoder ready");

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(ConfigError::from)?;

    // 2. Backgrounds
    let backgrounds = match &config.background_url_template {
        Some(template) => Backgrounds::Remote(RemoteBackgrounds::new(template.clone())),
        None => Backgrounds::Local(LocalBackgrounds::new(config.backgrounds_dir.clone())),
    };

    // 3. Admission, cache and workers
    let metrics = Arc::new(Metrics::new()?);
    let cache = TtlLruCache::new(config.cache_capacity, config.cache_ttl);
    let (controller, tasks) = AdmissionController::new(config.limits(), cache, metrics.clone());

    let worker = RenderWorker::new(
        runner.clone(),
        backgrounds,
        config.encode.clone(),
        config.output_dir.clone(),
        config.render_timeout,
        metrics,
    );
    let pool = WorkerPool::new(worker, controller.clone(), tasks);
    let shutdown = pool.shutdown_token();
    let workers = pool.start();
    info!(
        workers = config.workers,
        queue = config.queue_size,
        timeout_secs = config.render_timeout.as_secs(),
        "render pool started"
    );

    // 4. HTTP
    let app = http::router(AppState {
        controller,
        encoder: Arc::new(runner),
        output_dir: config.output_dir.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .map_err(ConfigError::from)?;
    info!(address = %config.bind_address(), "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown requested");
        })
        .await?;

    shutdown.cancel();
    for worker in workers {
        worker.await.ok();
    }
    Ok(())
}
