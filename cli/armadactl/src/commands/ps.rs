//! Ps command.

use anyhow::Result;
use armada_control_plane::job_states::JobState;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{display_option, print_output};

use super::{find_app, CommandContext};

/// List the jobs the scheduler reports for an app.
#[derive(Debug, Args)]
pub struct PsCommand {
    /// Application name.
    app: String,
}

#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    #[tabled(rename = "Job")]
    job: String,

    #[tabled(rename = "State")]
    state: String,

    #[tabled(rename = "Release")]
    release: String,

    #[tabled(rename = "Command", display = "display_option")]
    command: Option<String>,

    #[tabled(rename = "Host", display = "display_option")]
    host: Option<String>,
}

impl From<JobState> for JobRow {
    fn from(state: JobState) -> Self {
        let outdated = state
            .current_release
            .is_some_and(|current| current != state.release_version);
        let release = if outdated {
            format!("{} (outdated)", state.release_version).yellow().to_string()
        } else {
            state.release_version.to_string()
        };

        Self {
            job: format!("{}.{}", state.process_type, state.index),
            state: state.status.to_string(),
            release,
            command: state.command,
            host: state.host,
        }
    }
}

impl PsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let platform = ctx.platform().await?;
        let app = find_app(&platform, &self.app).await?;

        let rows: Vec<JobRow> = platform
            .job_states_by_app(&app.name)
            .await?
            .into_iter()
            .map(JobRow::from)
            .collect();
        print_output(&rows, ctx.format);
        Ok(())
    }
}
