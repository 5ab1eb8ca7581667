//! Scheduler abstraction.
//!
//! A [`Scheduler`] starts and stops jobs on a cluster and reports what is
//! running. Two backends exist:
//! - [`FakeScheduler`]: in-memory and instantly consistent, for tests
//! - [`FleetScheduler`]: talks to a fleet cluster over its HTTP API
//!
//! Job states are best effort. A backend may not yet reflect a schedule or
//! unschedule call that just returned.

mod fake;
mod fleet;

pub use fake::{FakeScheduler, SchedulerOp};
pub use fleet::FleetScheduler;

use std::sync::Arc;
use std::time::Duration;

use armada_id::AppName;
use armada_reconcile::RetryPolicy;
use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;

use crate::jobs::{JobId, JobSpec, ObservedJob};

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors that can occur talking to a scheduler backend.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The backend does not know the job.
    #[error("job not found: {0}")]
    NotFound(String),

    /// The request did not complete (connection, timeout, decode).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with an error status.
    #[error("backend rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The job spec cannot be expressed for this backend.
    #[error("invalid job: {0}")]
    InvalidJob(String),
}

impl SchedulerError {
    /// Returns true for failures worth retrying on idempotent calls.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::NotFound(_) | Self::InvalidJob(_) => false,
        }
    }
}

/// Cluster job scheduler.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Submit jobs for execution. Resubmitting a running job is a no-op.
    async fn schedule(&self, jobs: &[JobSpec]) -> SchedulerResult<()>;

    /// Stop a job. Fails with [`SchedulerError::NotFound`] for unknown jobs.
    async fn unschedule(&self, job_id: &JobId) -> SchedulerResult<()>;

    /// Current job states for one app, or for every app when `app` is `None`.
    async fn job_states(&self, app: Option<&AppName>) -> SchedulerResult<Vec<ObservedJob>>;
}

/// Setting value that selects the in-memory scheduler.
pub const FAKE_BACKEND: &str = "fake";

/// Which scheduler backend to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerBackend {
    Fake,
    Fleet(Url),
}

impl SchedulerBackend {
    /// Parses the backend setting: the literal `fake`, or a fleet API URL.
    pub fn from_setting(setting: &str) -> Result<Self, SchedulerError> {
        let setting = setting.trim();
        if setting == FAKE_BACKEND {
            return Ok(Self::Fake);
        }

        let url = Url::parse(setting)
            .map_err(|e| SchedulerError::Transport(format!("invalid scheduler URL '{setting}': {e}")))?;

        match url.scheme() {
            "http" | "https" => Ok(Self::Fleet(url)),
            other => Err(SchedulerError::Transport(format!(
                "unsupported scheduler URL scheme '{other}'"
            ))),
        }
    }

    /// Builds the selected backend. `call_budget` is the time one scheduler
    /// call may take, retries included.
    pub fn build(
        &self,
        retry: RetryPolicy,
        call_budget: Duration,
    ) -> SchedulerResult<Arc<dyn Scheduler>> {
        match self {
            Self::Fake => {
                tracing::warn!("Using in-memory fake scheduler; jobs will not run");
                Ok(Arc::new(FakeScheduler::new()))
            }
            Self::Fleet(url) => Ok(Arc::new(FleetScheduler::new(url.clone(), retry, call_budget)?)),
        }
    }
}
