//! Migrate command.

use anyhow::Result;
use armada_control_plane::db::{DbConfig, PgStore};

use crate::output::print_success;

/// Apply the bundled schema. Only needs `DATABASE_URL`.
pub async fn run() -> Result<()> {
    let store = PgStore::connect(&DbConfig::from_env()).await?;
    store.run_migrations().await?;
    print_success("Database migrations applied");
    Ok(())
}
