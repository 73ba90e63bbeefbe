use super::fingerprint::Fingerprint;
use super::params::JobParams;
use crate::error::RenderError;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// A render owned by the admission controller while queued or running.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub fingerprint: Fingerprint,
    pub params: Arc<JobParams>,
    pub state: JobState,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
}

impl Job {
    pub fn new(fingerprint: Fingerprint, params: Arc<JobParams>, state: JobState) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            fingerprint,
            params,
            state,
            created_at: now,
            started_at: (state == JobState::Running).then_some(now),
            completed_at: None,
        }
    }

    pub fn start(&mut self) {
        self.state = JobState::Running;
        self.started_at = Some(SystemTime::now());
    }

    pub fn finish(&mut self, outcome: &JobOutcome) {
        self.state = match outcome {
            Ok(_) => JobState::Succeeded,
            Err(_) => JobState::Failed,
        };
        self.completed_at = Some(SystemTime::now());
    }

    /// Unit of work handed to a worker slot.
    pub fn task(&self) -> RenderTask {
        RenderTask {
            job_id: self.id,
            fingerprint: self.fingerprint,
            params: self.params.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderTask {
    pub job_id: Uuid,
    pub fingerprint: Fingerprint,
    pub params: Arc<JobParams>,
}

/// Terminal record of a successful render; this is what the result cache keeps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedVideo {
    pub fingerprint: Fingerprint,
    #[serde(skip)]
    pub params: Arc<JobParams>,
    pub path: PathBuf,
    pub file_name: String,
    pub encode_time: Duration,
    pub completed_at: SystemTime,
}

/// What every waiter of a job receives.
pub type JobOutcome = Result<RenderedVideo, RenderError>;
