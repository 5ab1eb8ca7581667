//! Application commands.

use anyhow::Result;
use armada_control_plane::model::App;
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{print_output, print_single, print_success, OutputFormat};

use super::{parse_app_name, CommandContext};

/// Application commands.
#[derive(Debug, Args)]
pub struct AppsCommand {
    #[command(subcommand)]
    command: AppsSubcommand,
}

#[derive(Debug, Subcommand)]
enum AppsSubcommand {
    /// List applications.
    List,

    /// Create a new application.
    Create(CreateAppArgs),

    /// Stop every job of an application and delete it.
    Destroy(DestroyAppArgs),
}

#[derive(Debug, Args)]
struct CreateAppArgs {
    /// Application name.
    name: String,
}

#[derive(Debug, Args)]
struct DestroyAppArgs {
    /// Application name.
    name: String,

    /// Confirm the destruction.
    #[arg(long)]
    yes: bool,
}

impl AppsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            AppsSubcommand::List => list_apps(ctx).await,
            AppsSubcommand::Create(args) => create_app(ctx, args).await,
            AppsSubcommand::Destroy(args) => destroy_app(ctx, args).await,
        }
    }
}

#[derive(Debug, Clone, Serialize, Tabled)]
struct AppRow {
    #[tabled(rename = "Name")]
    name: String,

    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&App> for AppRow {
    fn from(app: &App) -> Self {
        Self {
            name: app.name.to_string(),
            created_at: app.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

async fn list_apps(ctx: CommandContext) -> Result<()> {
    let platform = ctx.platform().await?;
    let rows: Vec<AppRow> = platform.apps_all().await?.iter().map(AppRow::from).collect();
    print_output(&rows, ctx.format);
    Ok(())
}

async fn create_app(ctx: CommandContext, args: CreateAppArgs) -> Result<()> {
    let name = parse_app_name(&args.name)?;
    let platform = ctx.platform().await?;
    let app = platform.apps_create(name).await?;

    match ctx.format {
        OutputFormat::Json => print_single(&app),
        OutputFormat::Table => print_success(&format!("Created app '{}'", app.name)),
    }
    Ok(())
}

async fn destroy_app(ctx: CommandContext, args: DestroyAppArgs) -> Result<()> {
    let name = parse_app_name(&args.name)?;
    if !args.yes {
        return Err(CliError::NotConfirmed(args.name).into());
    }

    let platform = ctx.platform().await?;
    platform.apps_destroy(&name).await?;
    print_success(&format!("Destroyed app '{name}'"));
    Ok(())
}
