//! Error handling and display for the CLI.

use armada_control_plane::Error;
use colored::Colorize;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument { arg: String, reason: String },

    #[error("App '{0}' has no releases. Run `armadactl releases create` first.")]
    NoRelease(String),

    #[error("Refusing to destroy '{0}' without --yes")]
    NotConfirmed(String),
}

impl CliError {
    pub fn invalid(arg: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg: arg.into(),
            reason: reason.into(),
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(core) = err.downcast_ref::<Error>() {
        let hint = match core {
            Error::Conflict(_) => Some("Another change to this app landed first. Run the command again."),
            Error::Indeterminate(_) => Some(
                "The scheduler did not answer in time; the change may have been applied. Check `armadactl ps` before retrying.",
            ),
            Error::Scheduler(_) => {
                Some("Jobs started or stopped before the failure are recorded. Run the command again to continue.")
            }
            _ => None,
        };
        if let Some(hint) = hint {
            eprintln!("\n{}", format!("Hint: {hint}").yellow());
        }
    }
}
