use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use quotereel::adapters::backgrounds::{Backgrounds, RemoteBackgrounds};
use quotereel::adapters::http::{self, AppState};
use quotereel::domain::encode::EncodeSettings;
use quotereel::domain::sanitize::validate;
use quotereel::domain::{JobParams, RenderRequest};
use quotereel::ports::encoder::EncoderRunner;
use quotereel::{
    AdmissionController, AdmissionLimits, Metrics, QueueStatus, RenderWorker, TtlLruCache,
    WorkerPool,
};
use serde_json::{json, Value};
use std::io;
use std::num::NonZeroUsize;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tower::ServiceExt;

/// Encoder double: counts invocations, waits for a permit, then writes a
/// placeholder file at the output argument.
#[derive(Clone)]
struct GatedEncoder {
    calls: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl EncoderRunner for GatedEncoder {
    async fn run_encoder(&self, args: &[String]) -> io::Result<Output> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate
            .acquire()
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
            .forget();
        let output = args.last().expect("output path");
        tokio::fs::write(output, b"fake mp4").await?;
        Ok(Output {
            status: ExitStatus::from_raw(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }

    async fn version(&self) -> io::Result<String> {
        Ok("ffmpeg version test".into())
    }
}

struct Stack {
    controller: AdmissionController,
    app: Router,
    calls: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
    _dir: TempDir,
}

impl Stack {
    fn new(workers: usize, queue: usize, open: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Semaphore::new(if open { Semaphore::MAX_PERMITS } else { 0 }));
        let calls = Arc::new(AtomicUsize::new(0));
        let encoder = GatedEncoder {
            calls: calls.clone(),
            gate: gate.clone(),
        };

        let metrics = Arc::new(Metrics::new().unwrap());
        let (controller, tasks) = AdmissionController::new(
            AdmissionLimits { workers, queue },
            TtlLruCache::new(NonZeroUsize::new(16).unwrap(), Duration::from_secs(3600)),
            metrics.clone(),
        );
        let worker = RenderWorker::new(
            encoder.clone(),
            Backgrounds::Remote(RemoteBackgrounds::new("https://img.example.com/{id}.jpg")),
            EncodeSettings::default(),
            dir.path().to_path_buf(),
            Duration::from_secs(30),
            metrics,
        );
        WorkerPool::new(worker, controller.clone(), tasks).start();

        let app = http::router(AppState {
            controller: controller.clone(),
            encoder: Arc::new(encoder),
            output_dir: dir.path().to_path_buf(),
        });

        Self {
            controller,
            app,
            calls,
            gate,
            _dir: dir,
        }
    }

    fn open_gate(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    async fn wait_for(&self, status: QueueStatus) {
        for _ in 0..200 {
            if self.controller.status() == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("queue never reached {status:?}, at {:?}", self.controller.status());
    }

    async fn post_render(&self, body: Value) -> (StatusCode, Option<String>, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/render")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, retry_after, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

fn stay_hungry() -> JobParams {
    validate(&RenderRequest {
        background: Some("Rk6NuB-Tv6E".into()),
        quote: Some("Stay hungry".into()),
        template: Some("center".into()),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn second_identical_request_is_served_from_cache() {
    let stack = Stack::new(2, 4, true);
    let metrics = stack.controller.metrics().clone();
    let before = metrics.jobs_succeeded();

    let first = stack.controller.submit(stay_hungry()).unwrap();
    assert!(!first.is_cached());
    let first = first.outcome().await.unwrap();
    assert!(first.path.exists());
    assert_eq!(stack.calls.load(Ordering::SeqCst), 1);

    let second = stack.controller.submit(stay_hungry()).unwrap();
    assert!(second.is_cached());
    assert_eq!(second.outcome().await.unwrap(), first);

    assert_eq!(stack.calls.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.jobs_succeeded(), before + 1);
    assert_eq!(metrics.summary().cache_hits, 1);
}

#[tokio::test]
async fn concurrent_duplicates_share_one_encode() {
    let stack = Stack::new(2, 0, false);

    let waiters: Vec<_> = (0..10)
        .map(|_| {
            let submission = stack.controller.submit(stay_hungry()).unwrap();
            tokio::spawn(submission.outcome())
        })
        .collect();
    stack.wait_for(QueueStatus { running: 1, queued: 0 }).await;
    stack.open_gate();

    let outcomes: Vec<_> = futures::future::join_all(waiters)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(stack.calls.load(Ordering::SeqCst), 1);
    assert!(outcomes.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(stack.controller.metrics().summary().deduplicated, 9);
}

#[tokio::test]
async fn http_render_then_cache_hit() {
    let stack = Stack::new(1, 1, true);
    let body = json!({
        "background": "Rk6NuB-Tv6E",
        "quote": "Stay hungry",
        "template": "center"
    });

    let (status, _, first) = stack.post_render(body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["cached"], json!(false));
    let fingerprint = first["fingerprint"].as_str().unwrap().to_string();
    assert_eq!(fingerprint.len(), 16);
    assert_eq!(
        first["video_url"],
        json!(format!("/videos/{}.mp4", fingerprint))
    );

    let (status, _, second) = stack.post_render(body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], json!(true));
    assert_eq!(second["fingerprint"], json!(fingerprint));

    let (status, video) = stack.get(&format!("/videos/{}.mp4", fingerprint)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(video, "fake mp4");

    let (status, text) = stack.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.lines().any(|line| line == "jobs_succeeded_total 1"));
    assert!(text.lines().any(|line| line == "cache_hits_total 1"));
}

#[tokio::test]
async fn http_saturation_returns_503_with_retry_after() {
    let stack = Stack::new(1, 0, false);

    let app = stack.app.clone();
    let first = tokio::spawn(async move {
        let request = Request::builder()
            .method("POST")
            .uri("/render")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"background": "first", "quote": "A"}).to_string(),
            ))
            .unwrap();
        app.oneshot(request).await.unwrap().status()
    });
    stack.wait_for(QueueStatus { running: 1, queued: 0 }).await;

    let (status, retry_after, body) = stack
        .post_render(json!({"background": "second", "quote": "B"}))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(retry_after.as_deref(), Some("5"));
    assert_eq!(body["code"], json!("saturated"));

    stack.open_gate();
    assert_eq!(first.await.unwrap(), StatusCode::OK);

    let (status, _, _) = stack
        .post_render(json!({"background": "second", "quote": "B"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stack.controller.metrics().summary().jobs_rejected, 1);
}

#[tokio::test]
async fn http_rejects_invalid_requests_without_queueing() {
    let stack = Stack::new(1, 0, true);

    let (status, _, body) = stack
        .post_render(json!({"background": "../../etc/passwd", "quote": "hi"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("validation"));

    let (status, _, _) = stack.post_render(json!({"background": "abc"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = stack.post_render(json!("just a string")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("bad_body"));

    assert_eq!(stack.calls.load(Ordering::SeqCst), 0);
    let summary = stack.controller.metrics().summary();
    assert_eq!(summary.jobs_rejected, 0);
    assert_eq!(summary.jobs_failed, 0);
}

#[tokio::test]
async fn http_status_health_and_summary() {
    let stack = Stack::new(2, 3, true);

    let (status, body) = stack.get("/render/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({"running": 0, "queued": 0})
    );

    let (status, body) = stack.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], json!("ok"));
    assert_eq!(health["encoder"], json!("ffmpeg version test"));

    let (status, body) = stack.get("/metrics/summary").await;
    assert_eq!(status, StatusCode::OK);
    let summary: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(summary["jobs_succeeded"], json!(0));
    assert_eq!(summary["error_rate"], json!(0.0));
}
