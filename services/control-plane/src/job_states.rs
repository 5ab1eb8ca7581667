//! Job states: what the scheduler reports, joined with release metadata.
//!
//! Nothing is cached. Every call asks the scheduler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use armada_id::{AppName, ReleaseVersion};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::db::Store;
use crate::error::{Error, Result};
use crate::jobs::{JobId, JobStatus};
use crate::model::Release;
use crate::scheduler::Scheduler;

/// One job as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobState {
    pub app: AppName,
    pub release_version: ReleaseVersion,
    pub process_type: String,
    pub index: u32,
    pub job_id: JobId,
    pub status: JobStatus,

    /// Command from the job's release, if that release still exists.
    pub command: Option<String>,

    /// The app's latest release version.
    pub current_release: Option<ReleaseVersion>,

    pub host: Option<String>,
}

/// Reads job states for an app.
pub struct JobStatesService {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    call_timeout: Duration,
}

impl JobStatesService {
    pub fn new(store: Arc<dyn Store>, scheduler: Arc<dyn Scheduler>, call_timeout: Duration) -> Self {
        Self {
            store,
            scheduler,
            call_timeout,
        }
    }

    /// Jobs of `app` ordered by process type, then index.
    ///
    /// Fails with [`Error::NotFound`] if the app does not exist.
    #[instrument(skip(self, app), fields(app = %app))]
    pub async fn job_states_by_app(&self, app: &AppName) -> Result<Vec<JobState>> {
        if self.store.apps_find(app).await?.is_none() {
            return Err(Error::not_found("app", app));
        }

        let observed = tokio::time::timeout(self.call_timeout, self.scheduler.job_states(Some(app)))
            .await
            .map_err(|_| {
                Error::Indeterminate(format!(
                    "job_states did not complete within {}ms",
                    self.call_timeout.as_millis()
                ))
            })??;

        let current_release = self.store.releases_last(app).await?.map(|r| r.version);

        let mut releases: BTreeMap<ReleaseVersion, Option<Release>> = BTreeMap::new();
        let mut states = Vec::with_capacity(observed.len());

        for job in observed {
            let version = job.id.release_version;
            if !releases.contains_key(&version) {
                let release = self
                    .store
                    .releases_find_by_app_and_version(app, version)
                    .await?;
                releases.insert(version, release);
            }

            let command = releases
                .get(&version)
                .and_then(Option::as_ref)
                .and_then(|release| release.formation.get(&job.id.process_type))
                .map(|spec| spec.command.clone());

            states.push(JobState {
                app: job.id.app.clone(),
                release_version: version,
                process_type: job.id.process_type.clone(),
                index: job.id.index,
                status: job.status,
                command,
                current_release,
                host: job.host,
                job_id: job.id,
            });
        }

        states.sort_by(|a, b| {
            (&a.process_type, a.index, a.release_version).cmp(&(
                &b.process_type,
                b.index,
                b.release_version,
            ))
        });

        debug!(count = states.len(), "Fetched job states");
        Ok(states)
    }
}
