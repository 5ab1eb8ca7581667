//! Fleet cluster backend.
//!
//! Jobs map one-to-one to fleet units named `{job_id}.service`:
//! - schedule: `PUT /fleet/v1/units/{name}` with `desiredState=launched`
//! - unschedule: `DELETE /fleet/v1/units/{name}`
//! - job states: `GET /fleet/v1/state`, following `nextPageToken`
//!
//! Transient failures (transport errors, 5xx) are retried with backoff.
//! Unschedule is retried too: a 404 on a retry means an earlier attempt
//! already removed the unit.

use std::future::Future;
use std::time::Duration;

use armada_id::AppName;
use armada_reconcile::RetryPolicy;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{Scheduler, SchedulerError, SchedulerResult};
use crate::jobs::{JobId, JobSpec, JobStatus, ObservedJob};

const UNIT_SUFFIX: &str = ".service";

/// [`Scheduler`] backed by a fleet cluster.
pub struct FleetScheduler {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl FleetScheduler {
    /// Create a client for the fleet API at `url`.
    ///
    /// `call_budget` bounds one scheduler call including its retries; each
    /// HTTP request gets the share [`RetryPolicy::attempt_timeout`] leaves it.
    pub fn new(url: Url, retry: RetryPolicy, call_budget: Duration) -> SchedulerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(retry.attempt_timeout(call_budget))
            .build()
            .map_err(|e| SchedulerError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: url.as_str().trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn unit_url(&self, job_id: &JobId) -> String {
        format!("{}/fleet/v1/units/{}", self.base_url, unit_name(job_id))
    }

    async fn put_unit(&self, job: &JobSpec) -> SchedulerResult<()> {
        let body = UnitRequest {
            desired_state: "launched",
            options: unit_options(job)?,
        };

        let response = self
            .client
            .put(self.unit_url(&job.id))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            // 409: the unit already exists; scheduling is idempotent per job.
            status if status.is_success() || status == StatusCode::CONFLICT => Ok(()),
            _ => Err(rejected(response).await),
        }
    }

    async fn delete_unit(&self, job_id: &JobId) -> SchedulerResult<()> {
        let response = self
            .client
            .delete(self.unit_url(job_id))
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(SchedulerError::NotFound(job_id.to_string())),
            _ => Err(rejected(response).await),
        }
    }

    async fn fetch_state_page(&self, page_token: Option<&str>) -> SchedulerResult<StatePage> {
        let url = format!("{}/fleet/v1/state", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(token) = page_token {
            request = request.query(&[("nextPageToken", token)]);
        }

        let response = request.send().await.map_err(transport)?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        response.json().await.map_err(transport)
    }

    /// Runs `call` until it succeeds, fails permanently, or the retry policy
    /// is exhausted. `call` receives the 1-based attempt number.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, call: F) -> SchedulerResult<T>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = SchedulerResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call(attempt).await {
                Err(e) if e.is_transient() && self.retry.should_retry(attempt) => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Fleet request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl Scheduler for FleetScheduler {
    #[instrument(skip(self, jobs), fields(count = jobs.len()))]
    async fn schedule(&self, jobs: &[JobSpec]) -> SchedulerResult<()> {
        for job in jobs {
            debug!(job_id = %job.id, "Submitting fleet unit");
            self.with_retry("schedule", |_| self.put_unit(job)).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, job_id), fields(job_id = %job_id))]
    async fn unschedule(&self, job_id: &JobId) -> SchedulerResult<()> {
        self.with_retry("unschedule", |attempt| async move {
            match self.delete_unit(job_id).await {
                Err(SchedulerError::NotFound(_)) if attempt > 1 => {
                    debug!(attempt, "Unit already gone after retry");
                    Ok(())
                }
                result => result,
            }
        })
        .await
    }

    #[instrument(skip(self, app), fields(app = app.map(AppName::as_str)))]
    async fn job_states(&self, app: Option<&AppName>) -> SchedulerResult<Vec<ObservedJob>> {
        let mut observed = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .with_retry("job_states", |_| self.fetch_state_page(page_token.as_deref()))
                .await?;

            for state in page.states {
                let Some(job) = state.into_observed() else {
                    continue;
                };
                if app.is_none_or(|app| &job.id.app == app) {
                    observed.push(job);
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = observed.len(), "Fetched fleet unit states");
        Ok(observed)
    }
}

fn unit_name(job_id: &JobId) -> String {
    format!("{job_id}{UNIT_SUFFIX}")
}

/// Unit file options that run the job's image under docker.
fn unit_options(job: &JobSpec) -> SchedulerResult<Vec<UnitOption>> {
    if job.command.trim().is_empty() {
        return Err(SchedulerError::InvalidJob(format!(
            "{} has an empty command",
            job.id
        )));
    }

    let name = job.id.to_string();
    let image = job.image.to_string();

    let mut run = format!("/usr/bin/docker run --rm --name {name}");
    for (key, value) in &job.env {
        run.push_str(&format!(" -e {}", systemd_quote(&format!("{key}={value}"))));
    }
    run.push_str(&format!(" {image} {}", systemd_escape(&job.command)));

    Ok(vec![
        UnitOption::new("Unit", "Description", format!("{name} ({image})")),
        UnitOption::new("Service", "ExecStartPre", format!("-/usr/bin/docker rm -f {name}")),
        UnitOption::new("Service", "ExecStartPre", format!("/usr/bin/docker pull {image}")),
        UnitOption::new("Service", "ExecStart", run),
        UnitOption::new("Service", "ExecStop", format!("/usr/bin/docker stop {name}")),
        UnitOption::new("Service", "Restart", "always"),
    ])
}

/// Escapes systemd specifiers (`%`) and variable expansion (`$`).
fn systemd_escape(value: &str) -> String {
    value.replace('%', "%%").replace('$', "$$")
}

/// Quotes a single systemd command-line argument.
fn systemd_quote(arg: &str) -> String {
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", systemd_escape(&escaped))
}

fn transport(err: reqwest::Error) -> SchedulerError {
    SchedulerError::Transport(err.to_string())
}

async fn rejected(response: reqwest::Response) -> SchedulerError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    SchedulerError::Rejected { status, body }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnitRequest {
    desired_state: &'static str,
    options: Vec<UnitOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct UnitOption {
    section: &'static str,
    name: &'static str,
    value: String,
}

impl UnitOption {
    fn new(section: &'static str, name: &'static str, value: impl Into<String>) -> Self {
        Self {
            section,
            name,
            value: value.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatePage {
    #[serde(default)]
    states: Vec<UnitState>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnitState {
    name: String,
    #[serde(rename = "machineID", default)]
    machine_id: Option<String>,
    #[serde(default)]
    systemd_active_state: Option<String>,
}

impl UnitState {
    /// Converts a fleet unit state; units not named after a job are skipped.
    fn into_observed(self) -> Option<ObservedJob> {
        let id = self.name.strip_suffix(UNIT_SUFFIX)?.parse().ok()?;
        let status = match self.systemd_active_state.as_deref() {
            Some("active") => JobStatus::Running,
            Some("activating") | Some("reloading") => JobStatus::Starting,
            Some("inactive") | Some("deactivating") => JobStatus::Stopped,
            Some("failed") => JobStatus::Failed,
            _ => JobStatus::Unknown,
        };

        Some(ObservedJob {
            id,
            status,
            host: self.machine_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_id::ReleaseVersion;

    fn job() -> JobSpec {
        JobSpec {
            id: JobId::new(AppName::parse("web-app").unwrap(), ReleaseVersion::new(2), "web", 1),
            command: "./bin/web --port 8080".to_string(),
            image: "remind101/acme-inc:abc".parse().unwrap(),
            env: [("GREETING".to_string(), "say \"hi\" 100%".to_string())].into(),
        }
    }

    #[test]
    fn test_unit_name() {
        assert_eq!(unit_name(&job().id), "web-app.v2.web.1.service");
    }

    #[test]
    fn test_unit_options_exec_start() {
        let options = unit_options(&job()).unwrap();
        let exec_start = options
            .iter()
            .find(|o| o.name == "ExecStart")
            .map(|o| o.value.as_str())
            .unwrap();

        assert_eq!(
            exec_start,
            "/usr/bin/docker run --rm --name web-app.v2.web.1 \
             -e \"GREETING=say \\\"hi\\\" 100%%\" \
             remind101/acme-inc:abc ./bin/web --port 8080"
        );
    }

    #[test]
    fn test_unit_options_escape_variable_expansion() {
        let mut job = job();
        job.command = "./bin/web -p $PORT".to_string();
        job.env = [("DB_PASSWORD".to_string(), "pa$word${X}".to_string())].into();

        let options = unit_options(&job).unwrap();
        let exec_start = &options.iter().find(|o| o.name == "ExecStart").unwrap().value;

        assert!(exec_start.contains("-e \"DB_PASSWORD=pa$$word$${X}\""));
        assert!(exec_start.ends_with("./bin/web -p $$PORT"));
    }

    #[test]
    fn test_unit_options_rejects_empty_command() {
        let mut job = job();
        job.command = "  ".to_string();
        assert!(matches!(
            unit_options(&job),
            Err(SchedulerError::InvalidJob(_))
        ));
    }

    #[test]
    fn test_unit_state_conversion() {
        let state: UnitState = serde_json::from_value(serde_json::json!({
            "name": "web-app.v2.web.1.service",
            "hash": "abc",
            "machineID": "m1",
            "systemdLoadState": "loaded",
            "systemdActiveState": "activating",
            "systemdSubState": "start-pre"
        }))
        .unwrap();

        let observed = state.into_observed().unwrap();
        assert_eq!(observed.id, job().id);
        assert_eq!(observed.status, JobStatus::Starting);
        assert_eq!(observed.host.as_deref(), Some("m1"));
    }

    #[test]
    fn test_foreign_units_are_skipped() {
        let state = UnitState {
            name: "etcd.service".to_string(),
            machine_id: None,
            systemd_active_state: Some("active".to_string()),
        };
        assert!(state.into_observed().is_none());
    }
}
