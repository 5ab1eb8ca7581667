//! Release commands.

use std::sync::Arc;

use anyhow::Result;
use armada_control_plane::{
    formation::ProcessQuantityMap,
    model::{Image, ProcessCommands, Release},
    slugs::StaticExtractor,
};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_info, print_output, print_single, print_success, OutputFormat};

use super::{find_app, parse_pairs, CommandContext};

/// Release commands.
#[derive(Debug, Args)]
pub struct ReleasesCommand {
    #[command(subcommand)]
    command: ReleasesSubcommand,
}

#[derive(Debug, Subcommand)]
enum ReleasesSubcommand {
    /// List releases of an app, newest first.
    List(ListArgs),

    /// Create a release from an image.
    Create(CreateArgs),
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Application name.
    app: String,
}

#[derive(Debug, Args)]
struct CreateArgs {
    /// Application name.
    app: String,

    /// Image reference (repo[:tag]).
    image: String,

    /// Process type and command in format TYPE=COMMAND (e.g., web=./bin/web).
    /// Only used the first time an image is released.
    #[arg(long = "process", short = 'p')]
    processes: Vec<String>,

    /// Release description.
    #[arg(long, short = 'd', default_value = "")]
    description: String,

    /// Scale the new release right away, replacing the previous release's jobs.
    #[arg(long)]
    deploy: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct ReleaseRow {
    #[tabled(rename = "Version")]
    version: String,

    #[tabled(rename = "Processes")]
    processes: String,

    #[tabled(rename = "Description")]
    description: String,

    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&Release> for ReleaseRow {
    fn from(release: &Release) -> Self {
        let processes = release
            .formation
            .iter()
            .map(|(process_type, spec)| format!("{process_type}={}", spec.quantity))
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            version: release.version.to_string(),
            processes,
            description: release.description.clone(),
            created_at: release.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl ReleasesCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            ReleasesSubcommand::List(args) => list_releases(ctx, args).await,
            ReleasesSubcommand::Create(args) => create_release(ctx, args).await,
        }
    }
}

async fn list_releases(ctx: CommandContext, args: ListArgs) -> Result<()> {
    let platform = ctx.platform().await?;
    let app = find_app(&platform, &args.app).await?;

    let rows: Vec<ReleaseRow> = platform
        .releases_find_by_app(&app.name)
        .await?
        .iter()
        .map(ReleaseRow::from)
        .collect();
    print_output(&rows, ctx.format);
    Ok(())
}

async fn create_release(ctx: CommandContext, args: CreateArgs) -> Result<()> {
    let image: Image = args.image.parse()?;
    let commands: ProcessCommands = parse_pairs(&args.processes)?.into_iter().collect();

    let platform = ctx
        .platform_with(Arc::new(StaticExtractor::new(commands)))
        .await?;
    let app = find_app(&platform, &args.app).await?;

    let release = platform
        .releases_create_from_image(&app, &image, &args.description)
        .await?;

    match ctx.format {
        OutputFormat::Json => print_single(&release),
        OutputFormat::Table => print_success(&format!(
            "Created release {} of '{}' from {image}",
            release.version, app.name
        )),
    }

    if args.deploy {
        let outcome = platform
            .scale(&release, &ProcessQuantityMap::new())
            .await?;
        if ctx.format == OutputFormat::Table {
            print_info(&format!(
                "Deployed {}: {} jobs started, {} stopped",
                release.version,
                outcome.scheduled.len(),
                outcome.unscheduled.len()
            ));
        }
    }

    Ok(())
}
