//! Config commands.

use anyhow::Result;
use armada_control_plane::model::VarsUpdate;
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_output, print_success};

use super::{find_app, parse_pairs, CommandContext};

/// Config commands.
#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    /// Show the current config vars of an app.
    Show(ShowArgs),

    /// Set one or more vars (KEY=VALUE).
    Set(SetArgs),

    /// Remove one or more vars.
    Unset(UnsetArgs),
}

#[derive(Debug, Args)]
struct ShowArgs {
    /// Application name.
    app: String,
}

#[derive(Debug, Args)]
struct SetArgs {
    /// Application name.
    app: String,

    /// Vars in format KEY=VALUE.
    #[arg(required = true)]
    vars: Vec<String>,
}

#[derive(Debug, Args)]
struct UnsetArgs {
    /// Application name.
    app: String,

    /// Var names.
    #[arg(required = true)]
    keys: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct VarRow {
    #[tabled(rename = "Key")]
    key: String,

    #[tabled(rename = "Value")]
    value: String,
}

impl ConfigCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let platform = ctx.platform().await?;

        let (app, update) = match self.command {
            ConfigSubcommand::Show(args) => {
                let app = find_app(&platform, &args.app).await?;
                let config = platform.configs_current(&app).await?;
                let rows: Vec<VarRow> = config
                    .vars
                    .into_iter()
                    .map(|(key, value)| VarRow { key, value })
                    .collect();
                print_output(&rows, ctx.format);
                return Ok(());
            }
            ConfigSubcommand::Set(args) => {
                let update: VarsUpdate = parse_pairs(&args.vars)?
                    .into_iter()
                    .map(|(key, value)| (key, Some(value)))
                    .collect();
                (args.app, update)
            }
            ConfigSubcommand::Unset(args) => {
                let update: VarsUpdate = args.keys.into_iter().map(|key| (key, None)).collect();
                (args.app, update)
            }
        };

        let app = find_app(&platform, &app).await?;
        let config = platform.configs_apply(&app, &update).await?;
        print_success(&format!(
            "Updated config of '{}' ({} vars). Create a release to apply it.",
            app.name,
            config.vars.len()
        ));
        Ok(())
    }
}
