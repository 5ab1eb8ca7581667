//! CLI commands.

mod apps;
mod config;
mod migrate;
mod ps;
mod releases;
mod scale;

use std::sync::Arc;

use anyhow::Result;
use armada_control_plane::{
    config::Config,
    model::{App, Release},
    slugs::{Extractor, StaticExtractor},
    Platform,
};
use armada_id::AppName;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::CliError;
use crate::output::OutputFormat;

/// armada CLI - manage apps, releases and jobs.
#[derive(Debug, Parser)]
#[command(name = "armadactl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations.
    Migrate,

    /// Manage applications.
    Apps(apps::AppsCommand),

    /// Show or change app config vars.
    Config(config::ConfigCommand),

    /// Manage releases.
    Releases(releases::ReleasesCommand),

    /// Set process counts for the latest release.
    Scale(scale::ScaleCommand),

    /// List jobs of an app.
    Ps(ps::PsCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = OutputFormat::parse(&self.format);
        let log_json = self.log_json;
        let context = || CommandContext::load(format, log_json);

        match self.command {
            Commands::Migrate => {
                init_tracing("info", log_json);
                migrate::run().await
            }
            Commands::Apps(cmd) => cmd.run(context()?).await,
            Commands::Config(cmd) => cmd.run(context()?).await,
            Commands::Releases(cmd) => cmd.run(context()?).await,
            Commands::Scale(cmd) => cmd.run(context()?).await,
            Commands::Ps(cmd) => cmd.run(context()?).await,
            Commands::Version => {
                println!("armadactl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Initialize tracing (prefer RUST_LOG, fallback to ARMADA_LOG_LEVEL).
///
/// Logs go to stderr so command output stays machine-readable.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());
    let registry = tracing_subscriber::registry().with(filter);

    // Ignore the error if a subscriber is already installed.
    let _ = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    fn load(format: OutputFormat, log_json: bool) -> Result<Self> {
        let config = Config::from_env()?;
        init_tracing(&config.log_level, log_json);
        tracing::debug!(
            dev_mode = config.dev_mode,
            scheduler = ?config.scheduler,
            "Loaded configuration"
        );
        Ok(Self { config, format })
    }

    /// Connect to the platform with no process types known up front.
    pub async fn platform(&self) -> Result<Platform> {
        self.platform_with(Arc::new(StaticExtractor::default())).await
    }

    pub async fn platform_with(&self, extractor: Arc<dyn Extractor>) -> Result<Platform> {
        Platform::connect(&self.config, extractor).await
    }
}

pub(crate) fn parse_app_name(name: &str) -> Result<AppName> {
    AppName::parse(name).map_err(|e| CliError::invalid(name, e.to_string()).into())
}

pub(crate) async fn find_app(platform: &Platform, name: &str) -> Result<App> {
    Ok(platform.apps_find(&parse_app_name(name)?).await?)
}

pub(crate) async fn latest_release(platform: &Platform, app: &App) -> Result<Release> {
    platform
        .releases_last(&app.name)
        .await?
        .ok_or_else(|| CliError::NoRelease(app.name.to_string()).into())
}

/// Splits `KEY=VALUE` arguments, rejecting duplicates and empty keys.
pub(crate) fn parse_pairs(args: &[String]) -> Result<Vec<(String, String)>, CliError> {
    let mut seen = std::collections::BTreeSet::new();
    let mut pairs = Vec::with_capacity(args.len());

    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            return Err(CliError::invalid(arg, "use the format KEY=VALUE"));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::invalid(arg, "key cannot be empty"));
        }
        if !seen.insert(key.to_string()) {
            return Err(CliError::invalid(arg, format!("'{key}' specified multiple times")));
        }

        pairs.push((key.to_string(), value.to_string()));
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs(&args(&["web=3", "DATABASE_URL=postgres://a?b=c"])).unwrap();
        assert_eq!(pairs[0], ("web".to_string(), "3".to_string()));
        assert_eq!(pairs[1].1, "postgres://a?b=c");
    }

    #[rstest]
    #[case(&["web"])]
    #[case(&["=3"])]
    #[case(&["web=1", "web=2"])]
    fn test_parse_pairs_rejects(#[case] input: &[&str]) {
        assert!(parse_pairs(&args(input)).is_err());
    }

    #[test]
    fn test_cli_parses_scale() {
        let cli = Cli::try_parse_from(["armadactl", "scale", "web-app", "web=3", "worker=1"]).unwrap();
        assert!(matches!(cli.command, Commands::Scale(_)));
    }
}
