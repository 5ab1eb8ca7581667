//! Scale command.

use anyhow::Result;
use armada_control_plane::formation::ProcessQuantityMap;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{print_output, print_success, OutputFormat};

use super::{find_app, latest_release, parse_pairs, CommandContext};

/// Scale command - set the number of instances for process types of the
/// app's latest release.
#[derive(Debug, Args)]
pub struct ScaleCommand {
    /// Application name.
    app: String,

    /// Process type and count in format TYPE=COUNT (e.g., web=3).
    /// Can be specified multiple times.
    #[arg(required = true)]
    processes: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct ProcessScale {
    #[tabled(rename = "Process")]
    process_type: String,

    #[tabled(rename = "Command")]
    command: String,

    #[tabled(rename = "Running")]
    quantity: u32,
}

impl ScaleCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let quantities = parse_quantities(&self.processes)?;

        let platform = ctx.platform().await?;
        let app = find_app(&platform, &self.app).await?;
        let release = latest_release(&platform, &app).await?;

        let outcome = platform.scale(&release, &quantities).await?;

        let rows: Vec<ProcessScale> = outcome
            .formation
            .iter()
            .map(|(process_type, spec)| ProcessScale {
                process_type: process_type.to_string(),
                command: spec.command.clone(),
                quantity: spec.quantity,
            })
            .collect();

        if ctx.format == OutputFormat::Table {
            print_success(&format!(
                "Scaled '{}' {} ({} started, {} stopped)",
                app.name,
                release.version,
                outcome.scheduled.len(),
                outcome.unscheduled.len()
            ));
        }
        print_output(&rows, ctx.format);
        Ok(())
    }
}

fn parse_quantities(args: &[String]) -> Result<ProcessQuantityMap, CliError> {
    parse_pairs(args)?
        .into_iter()
        .map(|(process_type, raw)| -> Result<(String, u32), CliError> {
            let count = raw.trim().parse::<u32>().map_err(|_| {
                CliError::invalid(
                    format!("{process_type}={raw}"),
                    "count must be a non-negative number",
                )
            })?;
            Ok((process_type, count))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantities() {
        let parsed = parse_quantities(&["web=3".to_string(), "worker=0".to_string()]).unwrap();
        assert_eq!(parsed.get("web"), Some(&3));
        assert_eq!(parsed.get("worker"), Some(&0));

        assert!(parse_quantities(&["web=-1".to_string()]).is_err());
        assert!(parse_quantities(&["web=many".to_string()]).is_err());
    }
}
