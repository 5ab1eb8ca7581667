//! The manager turns a scale request into scheduler calls.
//!
//! A scale is applied in four steps: validate, plan, apply, record. Operations
//! run one at a time and stop at the first failure. Whatever was confirmed
//! before that point is written back as the app's [`ActiveFormation`], so the
//! store never claims more than the scheduler accepted. Nothing is rolled
//! back: the scheduler has no multi-operation transaction.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use armada_id::{AppName, FormationSeq, ReleaseVersion, RequestId};
use tracing::{debug, info, instrument, warn};

use crate::db::Store;
use crate::error::{Error, Result};
use crate::formation::{ActiveFormation, Formation, ProcessQuantityMap};
use crate::jobs::{self, DesiredJobs, JobId, JobOp};
use crate::model::{AppConfig, Release, Slug};
use crate::releases::processes_for;
use crate::scheduler::{Scheduler, SchedulerResult};

/// Default limit for a single scheduler call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Manager settings.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long one scheduler call may take before its outcome is considered
    /// unknown.
    pub call_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// What a successful scale did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleOutcome {
    pub release_version: ReleaseVersion,

    /// Formation now running, with achieved counts.
    pub formation: Formation,

    /// Jobs started, in call order.
    pub scheduled: Vec<JobId>,

    /// Jobs stopped, in call order.
    pub unscheduled: Vec<JobId>,

    /// Stamp of the stored active formation, `None` if the app has none.
    pub seq: Option<FormationSeq>,
}

/// Applies formations to the scheduler and records the result.
pub struct Manager {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    config: ManagerConfig,
}

impl Manager {
    pub fn new(store: Arc<dyn Store>, scheduler: Arc<dyn Scheduler>, config: ManagerConfig) -> Self {
        Self {
            store,
            scheduler,
            config,
        }
    }

    /// Scales `release` to `formation` with `quantities` applied.
    ///
    /// Fails with [`Error::Validation`] before touching the scheduler if
    /// `quantities` names a process type `formation` does not have. A scheduler
    /// call that exceeds the call timeout fails with [`Error::Indeterminate`].
    /// A concurrent scale of the same app that recorded first makes this one
    /// fail with [`Error::Conflict`].
    #[instrument(
        skip_all,
        fields(
            request_id = %RequestId::new(),
            app = %release.app,
            version = %release.version,
        )
    )]
    pub async fn scale_release(
        &self,
        release: &Release,
        config: &AppConfig,
        slug: &Slug,
        formation: &Formation,
        quantities: &ProcessQuantityMap,
    ) -> Result<ScaleOutcome> {
        formation.validate_quantities(quantities)?;
        if config.id != release.config_id || slug.id != release.slug_id {
            return Err(Error::Validation(format!(
                "config and slug must be the ones release {} was built from",
                release.version
            )));
        }

        let desired = DesiredJobs {
            app: release.app.clone(),
            release_version: release.version,
            formation: formation.merge(quantities),
            image: slug.image.clone(),
            env: config.vars.clone(),
        };

        let stamped = self.store.formation_find(&release.app).await?;
        let expected = stamped.as_ref().map(|s| s.seq);

        let observed: BTreeSet<JobId> = self
            .call("job_states", self.scheduler.job_states(Some(&release.app)))
            .await?
            .into_iter()
            .map(|job| job.id)
            .collect();

        // Jobs the scheduler reports but the store does not know about (left by
        // a call whose outcome was unknown) are adopted so they get managed.
        let baseline = {
            let mut known = stamped
                .as_ref()
                .map(|s| s.active.jobs.clone())
                .unwrap_or_default();
            known.extend(observed.iter().cloned());
            ActiveFormation::from_jobs(
                release.app.clone(),
                release.version,
                &desired.formation,
                known,
            )
        };

        let plan = jobs::plan(Some(&baseline), &desired, &observed);
        debug!(
            operations = plan.len(),
            schedules = plan.schedules().count(),
            unschedules = plan.unschedules().count(),
            "Computed scale plan"
        );

        // Known jobs the scheduler no longer reports only count again once a
        // repair confirms them.
        let mut achieved = observed.clone();
        let mut scheduled = Vec::new();
        let mut unscheduled = Vec::new();
        let mut failure = None;

        for op in &plan.ops {
            let result = match op {
                JobOp::Schedule(spec) => {
                    self.call("schedule", self.scheduler.schedule(std::slice::from_ref(spec)))
                        .await
                }
                JobOp::Unschedule(job_id) => {
                    self.call("unschedule", self.scheduler.unschedule(job_id))
                        .await
                }
            };

            match (op, result) {
                (JobOp::Schedule(spec), Ok(())) => {
                    achieved.insert(spec.id.clone());
                    scheduled.push(spec.id.clone());
                }
                (JobOp::Unschedule(job_id), Ok(())) => {
                    achieved.remove(job_id);
                    unscheduled.push(job_id.clone());
                }
                (JobOp::Unschedule(job_id), Err(Error::NotFound { .. })) => {
                    debug!(job_id = %job_id, "Job already gone");
                    achieved.remove(job_id);
                }
                (op, Err(e)) => {
                    warn!(job_id = %op.job_id(), error = %e, "Scheduler call failed, stopping scale");
                    failure = Some(e);
                    break;
                }
            }
        }

        let active = ActiveFormation::from_jobs(
            release.app.clone(),
            release.version,
            &desired.formation,
            achieved,
        );

        let seq = if stamped.as_ref().map(|s| &s.active) == Some(&active) {
            expected
        } else {
            match self.store.formation_update(&active, expected).await {
                Ok(seq) => Some(seq),
                Err(e) => {
                    let e = Error::from(e);
                    return Err(match failure {
                        Some(first) => {
                            warn!(error = %e, "Could not record partial scale");
                            first
                        }
                        None => e,
                    });
                }
            }
        };

        if let Some(e) = failure {
            return Err(e);
        }

        info!(
            scheduled = scheduled.len(),
            unscheduled = unscheduled.len(),
            total = active.formation.total_quantity(),
            "Scaled release"
        );

        Ok(ScaleOutcome {
            release_version: release.version,
            formation: active.formation,
            scheduled,
            unscheduled,
            seq,
        })
    }

    /// The formation currently in effect for `release`.
    pub async fn processes_all(&self, release: &Release) -> Result<Formation> {
        processes_for(self.store.as_ref(), release).await
    }

    /// Stops every job of `app`, known or observed. Returns the stopped jobs.
    ///
    /// The active formation is left in place; destroying the app removes it.
    #[instrument(skip(self, app), fields(app = %app))]
    pub async fn unschedule_app(&self, app: &AppName) -> Result<Vec<JobId>> {
        let mut jobs: BTreeSet<JobId> = self
            .store
            .formation_find(app)
            .await?
            .map(|s| s.active.jobs)
            .unwrap_or_default();
        let observed = self
            .call("job_states", self.scheduler.job_states(Some(app)))
            .await?;
        jobs.extend(observed.into_iter().map(|job| job.id));

        let mut stopped = Vec::with_capacity(jobs.len());
        for job_id in jobs.into_iter().rev() {
            match self.call("unschedule", self.scheduler.unschedule(&job_id)).await {
                Ok(()) => stopped.push(job_id),
                Err(Error::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        info!(count = stopped.len(), "Unscheduled app jobs");
        Ok(stopped)
    }

    async fn call<T>(
        &self,
        operation: &str,
        call: impl Future<Output = SchedulerResult<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::Indeterminate(format!(
                "{operation} did not complete within {}ms",
                self.config.call_timeout.as_millis()
            ))),
        }
    }
}
