//! Persistence for the control plane.
//!
//! This module provides:
//! - The [`Store`] trait every service reads and writes through
//! - [`MemoryStore`] for tests and local development
//! - [`PgStore`], the Postgres implementation, with pool management and
//!   migrations
//!
//! Apps, configs, slugs and releases are insert-only. The active formation is
//! the one mutable record per app and is guarded by a sequence number.

mod error;
mod memory;
mod postgres;

pub use error::DbError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::time::Duration;

use armada_id::{AppName, ConfigId, FormationSeq, ReleaseVersion, SlugId};
use async_trait::async_trait;

use crate::formation::{ActiveFormation, StampedFormation};
use crate::model::{App, AppConfig, Image, Release, Slug};

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Storage operations used by the services.
///
/// Finders return `Ok(None)` for absent records. Inserts that collide with an
/// existing key return [`DbError::Conflict`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn apps_create(&self, app: &App) -> DbResult<()>;
    async fn apps_find(&self, name: &AppName) -> DbResult<Option<App>>;
    async fn apps_all(&self) -> DbResult<Vec<App>>;

    /// Deletes an app and everything it owns. Returns false if it did not exist.
    async fn apps_destroy(&self, name: &AppName) -> DbResult<bool>;

    async fn configs_create(&self, config: &AppConfig) -> DbResult<()>;
    async fn configs_find(&self, id: &ConfigId) -> DbResult<Option<AppConfig>>;

    /// Most recently created config of an app.
    async fn configs_latest(&self, app: &AppName) -> DbResult<Option<AppConfig>>;

    async fn slugs_create(&self, slug: &Slug) -> DbResult<()>;
    async fn slugs_find(&self, id: &SlugId) -> DbResult<Option<Slug>>;
    async fn slugs_find_by_image(&self, image: &Image) -> DbResult<Option<Slug>>;

    /// Inserts a release. A release with the same app and version is a conflict.
    async fn releases_create(&self, release: &Release) -> DbResult<()>;

    /// Releases of an app, newest first.
    async fn releases_find_by_app(&self, app: &AppName) -> DbResult<Vec<Release>>;
    async fn releases_find_by_app_and_version(
        &self,
        app: &AppName,
        version: ReleaseVersion,
    ) -> DbResult<Option<Release>>;
    async fn releases_last(&self, app: &AppName) -> DbResult<Option<Release>>;

    async fn formation_find(&self, app: &AppName) -> DbResult<Option<StampedFormation>>;

    /// Writes the active formation of an app.
    ///
    /// `expected` is the sequence the caller read, or `None` if no record
    /// existed. If the stored sequence differs the write is rejected with
    /// [`DbError::Conflict`]. Returns the new sequence.
    async fn formation_update(
        &self,
        active: &ActiveFormation,
        expected: Option<FormationSeq>,
    ) -> DbResult<FormationSeq>;

    /// Deletes every record.
    async fn reset(&self) -> DbResult<()>;
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL.
    pub database_url: String,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Minimum number of idle connections.
    pub min_connections: u32,

    /// Connection acquire timeout.
    pub acquire_timeout: Duration,

    /// Idle connection timeout.
    pub idle_timeout: Duration,

    /// Maximum lifetime of a connection.
    pub max_lifetime: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/armada".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DbConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_connections),
            min_connections: lookup("DB_MIN_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_connections),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
    }

    #[test]
    fn test_db_config_from_lookup() {
        let config = DbConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://db/armada_test".to_string()),
            "DB_MAX_CONNECTIONS" => Some("4".to_string()),
            "DB_MIN_CONNECTIONS" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(config.database_url, "postgres://db/armada_test");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.min_connections, 1);
    }
}
