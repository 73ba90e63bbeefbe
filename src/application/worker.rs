use crate::application::admission::{AdmissionController, DispatchReceiver};
use crate::domain::encode::{self, EncodeSettings};
use crate::domain::{JobOutcome, RenderTask, RenderedVideo};
use crate::error::RenderError;
use crate::metrics::Metrics;
use crate::ports::backgrounds::BackgroundSource;
use crate::ports::encoder::EncoderRunner;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bytes of encoder stderr kept in `RenderError::EncoderExit`.
const STDERR_TAIL_BYTES: usize = 2048;

/// Executes one render: resolve the background, run the encoder under a
/// deadline, publish the file.
pub struct RenderWorker<R, B> {
    runner: R,
    backgrounds: B,
    settings: EncodeSettings,
    output_dir: PathBuf,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl<R, B> RenderWorker<R, B>
where
    R: EncoderRunner,
    B: BackgroundSource,
{
    pub fn new(
        runner: R,
        backgrounds: B,
        settings: EncodeSettings,
        output_dir: PathBuf,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            runner,
            backgrounds,
            settings,
            output_dir,
            timeout,
            metrics,
        }
    }

    /// Render `task` and record the outcome in the metrics registry.
    pub async fn render(&self, task: &RenderTask) -> JobOutcome {
        let outcome = self.encode(task).await;
        match &outcome {
            Ok(video) => self.metrics.record_success(video.encode_time),
            Err(e) if e.is_config() => {
                error!(job_id = %task.job_id, error = %e, "encoder binary is not runnable");
            }
            Err(e) => self.metrics.record_failure(e.reason()),
        }
        outcome
    }

    async fn encode(&self, task: &RenderTask) -> JobOutcome {
        let input = self.backgrounds.resolve(&task.params.background).await?;

        let file_name = format!("{}.mp4", task.fingerprint);
        let final_path = self.output_dir.join(&file_name);
        let part_path = self.output_dir.join(format!("{}.part.mp4", task.fingerprint));
        let args = encode::build_args(&task.params, &input, &part_path, &self.settings);

        debug!(job_id = %task.job_id, fingerprint = %task.fingerprint, input = %input, "starting encoder");
        let started = Instant::now();
        let output = match tokio::time::timeout(self.timeout, self.runner.run_encoder(&args)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                remove_partial(&part_path).await;
                return Err(spawn_error(e));
            }
            Err(_) => {
                // The runner future is dropped here, which kills the process.
                remove_partial(&part_path).await;
                return Err(RenderError::Timeout(self.timeout));
            }
        };
        let encode_time = started.elapsed();

        if !output.status.success() {
            remove_partial(&part_path).await;
            return Err(RenderError::EncoderExit {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        tokio::fs::rename(&part_path, &final_path).await?;
        info!(
            job_id = %task.job_id,
            fingerprint = %task.fingerprint,
            encode_ms = encode_time.as_millis() as u64,
            "render finished"
        );

        Ok(RenderedVideo {
            fingerprint: task.fingerprint,
            params: task.params.clone(),
            path: final_path,
            file_name,
            encode_time,
            completed_at: SystemTime::now(),
        })
    }
}

fn spawn_error(err: std::io::Error) -> RenderError {
    match err.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            RenderError::Config(err.to_string())
        }
        _ => RenderError::Spawn(err.to_string()),
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial output"),
    }
}

/// Last `STDERR_TAIL_BYTES` of stderr, trimmed, cut on a char boundary.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

/// K long-lived worker tasks draining the admission controller's dispatch
/// channel. Every dispatched task is reported back through
/// [`AdmissionController::complete`].
pub struct WorkerPool<R, B> {
    worker: Arc<RenderWorker<R, B>>,
    controller: AdmissionController,
    tasks: Arc<Mutex<DispatchReceiver>>,
    size: usize,
    shutdown: CancellationToken,
}

impl<R, B> WorkerPool<R, B>
where
    R: EncoderRunner + 'static,
    B: BackgroundSource + 'static,
{
    pub fn new(
        worker: RenderWorker<R, B>,
        controller: AdmissionController,
        tasks: DispatchReceiver,
    ) -> Self {
        let size = controller.limits().workers;
        Self {
            worker: Arc::new(worker),
            controller,
            tasks: Arc::new(Mutex::new(tasks)),
            size,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops every worker loop once cancelled. Renders in progress
    /// are abandoned with their encoder process.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn start(&self) -> Vec<JoinHandle<()>> {
        (0..self.size)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    self.worker.clone(),
                    self.controller.clone(),
                    self.tasks.clone(),
                    self.shutdown.clone(),
                ))
            })
            .collect()
    }
}

async fn worker_loop<R, B>(
    worker_id: usize,
    worker: Arc<RenderWorker<R, B>>,
    controller: AdmissionController,
    tasks: Arc<Mutex<DispatchReceiver>>,
    shutdown: CancellationToken,
) where
    R: EncoderRunner + 'static,
    B: BackgroundSource + 'static,
{
    info!(worker_id, "render worker started");
    loop {
        let next = {
            let mut receiver = tokio::select! {
                _ = shutdown.cancelled() => break,
                guard = tasks.lock() => guard,
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                task = receiver.recv() => task,
            }
        };
        let Some(task) = next else {
            break;
        };

        let fingerprint = task.fingerprint;
        let mut job = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.render(&task).await })
        };
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => {
                job.abort();
                controller.metrics().record_failure(RenderError::Lost.reason());
                Err(RenderError::Lost)
            }
            joined = &mut job => joined.unwrap_or_else(|e| {
                error!(worker_id, %fingerprint, error = %e, "render task panicked");
                controller.metrics().record_failure(RenderError::Lost.reason());
                Err(RenderError::Lost)
            }),
        };
        controller.complete(fingerprint, outcome);
    }
    info!(worker_id, "render worker stopped");
}
