//! Jobs: scheduled instances of a process type.
//!
//! A job is identified by `{app}.v{version}.{process_type}.{index}`. App
//! names and process types never contain dots, so the identifier parses back
//! unambiguously from scheduler unit names.

mod translator;

pub use translator::{plan, DesiredJobs, JobOp, Plan};

use std::fmt;
use std::str::FromStr;

use armada_id::{AppName, ReleaseVersion};
use serde::{Deserialize, Serialize};

use crate::model::{Image, Vars};

/// Identifier of one job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId {
    pub app: AppName,
    pub release_version: ReleaseVersion,
    pub process_type: String,
    pub index: u32,
}

impl JobId {
    pub fn new(
        app: AppName,
        release_version: ReleaseVersion,
        process_type: impl Into<String>,
        index: u32,
    ) -> Self {
        Self {
            app,
            release_version,
            process_type: process_type.into(),
            index,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.app, self.release_version, self.process_type, self.index
        )
    }
}

/// Error returned when a string is not a job identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid job id '{0}'")]
pub struct InvalidJobId(pub String);

impl FromStr for JobId {
    type Err = InvalidJobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidJobId(s.to_string());

        let parts: Vec<&str> = s.split('.').collect();
        let [app, version, process_type, index] = parts.as_slice() else {
            return Err(invalid());
        };

        let app = AppName::parse(app).map_err(|_| invalid())?;
        let release_version = ReleaseVersion::parse_tagged(version).map_err(|_| invalid())?;
        crate::formation::validate_process_type(process_type).map_err(|_| invalid())?;
        let index = index.parse().map_err(|_| invalid())?;

        Ok(Self::new(app, release_version, *process_type, index))
    }
}

impl Serialize for JobId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Everything a scheduler backend needs to run one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub command: String,
    pub image: Image,
    pub env: Vars,
}

/// Lifecycle status of a job as reported by a scheduler backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    Running,
    Stopped,
    Failed,
    Unknown,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Raw job state as returned by a scheduler backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedJob {
    pub id: JobId,
    pub status: JobStatus,

    /// Machine the backend placed the job on, if it reports one.
    pub host: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_job_id_display_and_parse() {
        let id = JobId::new(
            AppName::parse("web-app").unwrap(),
            ReleaseVersion::new(3),
            "web",
            2,
        );
        assert_eq!(id.to_string(), "web-app.v3.web.2");
        assert_eq!("web-app.v3.web.2".parse::<JobId>().unwrap(), id);
    }

    #[rstest]
    #[case("web-app.v3.web")]
    #[case("web-app.3.web.2")]
    #[case("web-app.v3.web.two")]
    #[case("Web-App.v3.web.2")]
    #[case("web-app.v3.web.2.service")]
    #[case("")]
    fn test_job_id_rejects(#[case] input: &str) {
        assert!(input.parse::<JobId>().is_err());
    }

    #[test]
    fn test_job_ids_order_by_type_then_index() {
        let app = AppName::parse("web-app").unwrap();
        let v1 = ReleaseVersion::new(1);
        let mut ids = vec![
            JobId::new(app.clone(), v1, "worker", 0),
            JobId::new(app.clone(), v1, "web", 10),
            JobId::new(app.clone(), v1, "web", 2),
        ];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["web-app.v1.web.2", "web-app.v1.web.10", "web-app.v1.worker.0"]
        );
    }

    #[test]
    fn test_job_status_serde() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }
}
