//! Admission control, deduplication and result caching for render jobs.
//!
//! Every decision happens in one short critical section guarded by a
//! `parking_lot::Mutex`: result cache lookup, in-flight lookup, slot or queue
//! assignment. Nothing inside it awaits. Workers never touch this state; they
//! call [`AdmissionController::complete`] when a render ends.
//!
//! Each admitted job owns a broadcast channel. Callers that ask for the same
//! fingerprint while it is queued or running subscribe to it, and completion
//! publishes the outcome once to all of them.

use crate::cache::TtlLruCache;
use crate::domain::{Fingerprint, Job, JobOutcome, JobParams, JobState, RenderTask, RenderedVideo};
use crate::error::{RenderError, SubmitError};
use crate::metrics::Metrics;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Pool size (K) and pending queue bound (Q).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionLimits {
    pub workers: usize,
    pub queue: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub running: usize,
    pub queued: usize,
}

pub type ResultCache = TtlLruCache<Fingerprint, RenderedVideo>;

/// Tasks handed from the controller to the worker pool.
pub type DispatchReceiver = mpsc::UnboundedReceiver<RenderTask>;

#[derive(Debug)]
pub enum Submission {
    /// Served from the result cache without touching the queue.
    Cached(RenderedVideo),
    /// Admitted, queued, or attached to an identical job already in flight.
    Pending(JobHandle),
}

impl Submission {
    pub fn is_cached(&self) -> bool {
        matches!(self, Submission::Cached(_))
    }

    pub async fn outcome(self) -> JobOutcome {
        match self {
            Submission::Cached(video) => Ok(video),
            Submission::Pending(handle) => handle.wait().await,
        }
    }
}

/// Resolves when the job it is attached to completes. Dropping it does not
/// cancel the render.
#[derive(Debug)]
pub struct JobHandle {
    pub fingerprint: Fingerprint,
    pub job_id: Uuid,
    receiver: broadcast::Receiver<JobOutcome>,
}

impl JobHandle {
    pub async fn wait(mut self) -> JobOutcome {
        match self.receiver.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(RenderError::Lost),
        }
    }
}

struct InFlight {
    job: Job,
    notify: broadcast::Sender<JobOutcome>,
    waiters: usize,
}

struct State {
    cache: ResultCache,
    in_flight: HashMap<Fingerprint, InFlight>,
    queue: VecDeque<Fingerprint>,
    running: usize,
}

struct Shared {
    state: Mutex<State>,
    limits: AdmissionLimits,
    dispatch: mpsc::UnboundedSender<RenderTask>,
    metrics: Arc<Metrics>,
}

#[derive(Clone)]
pub struct AdmissionController {
    shared: Arc<Shared>,
}

impl AdmissionController {
    /// Build the controller and the receiving end the worker pool drains.
    pub fn new(
        limits: AdmissionLimits,
        cache: ResultCache,
        metrics: Arc<Metrics>,
    ) -> (Self, DispatchReceiver) {
        let (dispatch, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    cache,
                    in_flight: HashMap::new(),
                    queue: VecDeque::new(),
                    running: 0,
                }),
                limits,
                dispatch,
                metrics,
            }),
        };
        controller.shared.metrics.set_queue(0, 0);
        (controller, receiver)
    }

    pub fn limits(&self) -> AdmissionLimits {
        self.shared.limits
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    pub fn submit(&self, params: JobParams) -> Result<Submission, SubmitError> {
        let fingerprint = Fingerprint::of(&params);
        let shared = &self.shared;
        let mut state = shared.state.lock();

        if let Some(video) = state.cache.get(&fingerprint).cloned() {
            if *video.params == params {
                drop(state);
                shared.metrics.record_cache_hit();
                debug!(%fingerprint, "served from result cache");
                return Ok(Submission::Cached(video));
            }
            warn!(%fingerprint, "fingerprint collision in result cache, rendering again");
        }

        if let Some(entry) = state.in_flight.get_mut(&fingerprint) {
            if *entry.job.params != params {
                warn!(%fingerprint, "fingerprint collision with in-flight job");
                return Err(SubmitError::FingerprintCollision(fingerprint.to_string()));
            }
            entry.waiters += 1;
            let handle = JobHandle {
                fingerprint,
                job_id: entry.job.id,
                receiver: entry.notify.subscribe(),
            };
            let waiters = entry.waiters;
            drop(state);
            shared.metrics.record_deduplicated();
            debug!(%fingerprint, waiters, "attached to in-flight render");
            return Ok(Submission::Pending(handle));
        }

        let job_state = if state.running < shared.limits.workers {
            JobState::Running
        } else if state.queue.len() < shared.limits.queue {
            JobState::Queued
        } else {
            let status = status_of(&state);
            drop(state);
            shared.metrics.record_rejected();
            info!(%fingerprint, running = status.running, queued = status.queued, "render queue saturated");
            return Err(SubmitError::Saturated {
                running: status.running,
                queued: status.queued,
            });
        };

        let job = Job::new(fingerprint, Arc::new(params), job_state);
        let (notify, receiver) = broadcast::channel(1);
        let handle = JobHandle {
            fingerprint,
            job_id: job.id,
            receiver,
        };
        let task = job.task();
        info!(%fingerprint, job_id = %job.id, state = ?job_state, "render job admitted");

        state.in_flight.insert(
            fingerprint,
            InFlight {
                job,
                notify,
                waiters: 1,
            },
        );
        match job_state {
            JobState::Running => {
                state.running += 1;
                self.dispatch_locked(&mut state, task);
            }
            _ => state.queue.push_back(fingerprint),
        }
        self.publish_gauges(&state);

        Ok(Submission::Pending(handle))
    }

    /// Called by a worker once a render has ended, successfully or not.
    pub fn complete(&self, fingerprint: Fingerprint, outcome: JobOutcome) {
        let mut state = self.shared.state.lock();
        let Some(mut entry) = state.in_flight.remove(&fingerprint) else {
            warn!(%fingerprint, "completion for a job that is not in flight");
            return;
        };

        entry.job.finish(&outcome);
        if let Ok(video) = &outcome {
            state.cache.set(fingerprint, video.clone());
        }
        state.running = state.running.saturating_sub(1);
        self.promote_locked(&mut state);
        self.publish_gauges(&state);
        drop(state);

        match &outcome {
            Ok(_) => info!(%fingerprint, job_id = %entry.job.id, waiters = entry.waiters, "render job succeeded"),
            Err(e) => warn!(%fingerprint, job_id = %entry.job.id, waiters = entry.waiters, error = %e, "render job failed"),
        }
        // No receivers left just means every caller went away.
        let _ = entry.notify.send(outcome);
    }

    pub fn status(&self) -> QueueStatus {
        status_of(&self.shared.state.lock())
    }

    /// Whether a live result for `fingerprint` is cached.
    pub fn is_cached(&self, fingerprint: &Fingerprint) -> bool {
        self.shared.state.lock().cache.has(fingerprint)
    }

    pub fn cache_size(&self) -> usize {
        self.shared.state.lock().cache.size()
    }

    pub fn clear_cache(&self) {
        self.shared.state.lock().cache.clear();
    }

    /// Start queued jobs, oldest first, while slots are free.
    fn promote_locked(&self, state: &mut State) {
        while state.running < self.shared.limits.workers {
            let Some(next) = state.queue.pop_front() else {
                break;
            };
            let Some(entry) = state.in_flight.get_mut(&next) else {
                continue;
            };
            entry.job.start();
            let task = entry.job.task();
            debug!(fingerprint = %next, job_id = %task.job_id, "promoted queued render");
            state.running += 1;
            self.dispatch_locked(state, task);
        }
    }

    fn dispatch_locked(&self, state: &mut State, task: RenderTask) {
        if let Err(mpsc::error::SendError(task)) = self.shared.dispatch.send(task) {
            error!(fingerprint = %task.fingerprint, "worker pool is gone, dropping job");
            // Dropping the sender resolves every waiter with `RenderError::Lost`.
            state.in_flight.remove(&task.fingerprint);
            state.running = state.running.saturating_sub(1);
            self.shared.metrics.record_failure(RenderError::Lost.reason());
        }
    }

    fn publish_gauges(&self, state: &State) {
        self.shared.metrics.set_queue(state.running, state.queue.len());
    }
}

fn status_of(state: &State) -> QueueStatus {
    QueueStatus {
        running: state.running,
        queued: state.queue.len(),
    }
}
