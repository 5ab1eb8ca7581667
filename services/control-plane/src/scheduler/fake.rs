//! In-memory scheduler for tests and local development.
//!
//! Every call is reflected in its own state immediately, so job states are
//! always consistent with the calls that returned. The fake also records each
//! schedule/unschedule attempt and can be told to fail specific jobs, lose
//! jobs silently, answer slowly, or never answer for one job.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use armada_id::AppName;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Scheduler, SchedulerError, SchedulerResult};
use crate::jobs::{JobId, JobSpec, JobStatus, ObservedJob};

/// A recorded call against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerOp {
    Schedule(JobId),
    Unschedule(JobId),
}

#[derive(Default)]
struct FakeState {
    jobs: BTreeMap<JobId, JobSpec>,
    ops: Vec<SchedulerOp>,
    fail_schedule: BTreeSet<JobId>,
    fail_unschedule: BTreeSet<JobId>,
    stalled: BTreeSet<JobId>,
}

/// In-memory [`Scheduler`].
#[derive(Default)]
pub struct FakeScheduler {
    state: Mutex<FakeState>,
    latency: Option<Duration>,
}

impl FakeScheduler {
    /// Create a new fake scheduler with no jobs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it takes effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every schedule/unschedule call made so far, in order.
    pub async fn operations(&self) -> Vec<SchedulerOp> {
        self.state.lock().await.ops.clone()
    }

    /// Forget the recorded operations.
    pub async fn clear_operations(&self) {
        self.state.lock().await.ops.clear();
    }

    /// Make scheduling `job_id` fail until cleared.
    pub async fn fail_schedule_of(&self, job_id: JobId) {
        self.state.lock().await.fail_schedule.insert(job_id);
    }

    /// Make unscheduling `job_id` fail until cleared.
    pub async fn fail_unschedule_of(&self, job_id: JobId) {
        self.state.lock().await.fail_unschedule.insert(job_id);
    }

    /// Make every call that touches `job_id` hang until cleared.
    pub async fn stall_job(&self, job_id: JobId) {
        self.state.lock().await.stalled.insert(job_id);
    }

    /// Clear all injected failures and stalls.
    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.fail_schedule.clear();
        state.fail_unschedule.clear();
        state.stalled.clear();
    }

    /// Drop a job without recording an operation, as if it crashed.
    pub async fn lose_job(&self, job_id: &JobId) -> bool {
        self.state.lock().await.jobs.remove(job_id).is_some()
    }

    /// Ids of all jobs currently running.
    pub async fn running_jobs(&self) -> Vec<JobId> {
        self.state.lock().await.jobs.keys().cloned().collect()
    }

    /// The spec a job was scheduled with.
    pub async fn spec(&self, job_id: &JobId) -> Option<JobSpec> {
        self.state.lock().await.jobs.get(job_id).cloned()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Scheduler for FakeScheduler {
    async fn schedule(&self, jobs: &[JobSpec]) -> SchedulerResult<()> {
        self.delay().await;

        let mut state = self.state.lock().await;
        for job in jobs {
            state.ops.push(SchedulerOp::Schedule(job.id.clone()));

            if state.stalled.contains(&job.id) {
                drop(state);
                return std::future::pending().await;
            }
            if state.fail_schedule.contains(&job.id) {
                return Err(SchedulerError::Transport(format!(
                    "injected schedule failure for {}",
                    job.id
                )));
            }

            debug!(job_id = %job.id, command = %job.command, "[FAKE] Scheduling job");
            state.jobs.insert(job.id.clone(), job.clone());
        }

        Ok(())
    }

    async fn unschedule(&self, job_id: &JobId) -> SchedulerResult<()> {
        self.delay().await;

        let mut state = self.state.lock().await;
        state.ops.push(SchedulerOp::Unschedule(job_id.clone()));

        if state.stalled.contains(job_id) {
            drop(state);
            return std::future::pending().await;
        }
        if state.fail_unschedule.contains(job_id) {
            return Err(SchedulerError::Transport(format!(
                "injected unschedule failure for {job_id}"
            )));
        }

        debug!(job_id = %job_id, "[FAKE] Unscheduling job");
        match state.jobs.remove(job_id) {
            Some(_) => Ok(()),
            None => Err(SchedulerError::NotFound(job_id.to_string())),
        }
    }

    async fn job_states(&self, app: Option<&AppName>) -> SchedulerResult<Vec<ObservedJob>> {
        self.delay().await;

        let state = self.state.lock().await;
        Ok(state
            .jobs
            .keys()
            .filter(|id| app.is_none_or(|app| &id.app == app))
            .map(|id| ObservedJob {
                id: id.clone(),
                status: JobStatus::Running,
                host: Some("fake".to_string()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_id::ReleaseVersion;

    fn spec(app: &str, index: u32) -> JobSpec {
        JobSpec {
            id: JobId::new(AppName::parse(app).unwrap(), ReleaseVersion::FIRST, "web", index),
            command: "./bin/web".to_string(),
            image: "remind101/acme-inc:latest".parse().unwrap(),
            env: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_schedule_is_idempotent() {
        let scheduler = FakeScheduler::new();
        let job = spec("web-app", 0);

        scheduler.schedule(&[job.clone()]).await.unwrap();
        scheduler.schedule(&[job.clone()]).await.unwrap();

        assert_eq!(scheduler.running_jobs().await, vec![job.id.clone()]);
        assert_eq!(scheduler.operations().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unschedule_unknown_job_is_not_found() {
        let scheduler = FakeScheduler::new();
        let err = scheduler.unschedule(&spec("web-app", 0).id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_job_states_filter_by_app() {
        let scheduler = FakeScheduler::new();
        scheduler
            .schedule(&[spec("web-app", 0), spec("web-app", 1), spec("other", 0)])
            .await
            .unwrap();

        let app = AppName::parse("web-app").unwrap();
        let states = scheduler.job_states(Some(&app)).await.unwrap();
        assert_eq!(states.len(), 2);
        assert!(states.iter().all(|s| s.status == JobStatus::Running));

        assert_eq!(scheduler.job_states(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_injected_failure_and_lost_job() {
        let scheduler = FakeScheduler::new();
        let job = spec("web-app", 0);

        scheduler.fail_schedule_of(job.id.clone()).await;
        assert!(scheduler.schedule(&[job.clone()]).await.is_err());
        assert!(scheduler.running_jobs().await.is_empty());

        scheduler.clear_failures().await;
        scheduler.schedule(&[job.clone()]).await.unwrap();
        assert!(scheduler.lose_job(&job.id).await);
        assert!(scheduler.running_jobs().await.is_empty());
        // Losing a job is not a recorded operation.
        assert_eq!(scheduler.operations().await.len(), 2);
    }

    #[tokio::test]
    async fn test_stalled_job_never_answers() {
        let scheduler = FakeScheduler::new();
        let job = spec("web-app", 0);
        scheduler.stall_job(job.id.clone()).await;

        let jobs = [job.clone()];
        let call = tokio::time::timeout(
            Duration::from_millis(20),
            scheduler.schedule(&jobs),
        );
        assert!(call.await.is_err());
        assert!(scheduler.running_jobs().await.is_empty());

        scheduler.clear_failures().await;
        scheduler.schedule(&[job]).await.unwrap();
        assert_eq!(scheduler.running_jobs().await.len(), 1);
    }
}
