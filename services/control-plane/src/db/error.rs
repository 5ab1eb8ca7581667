//! Database error types.

use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}. Run from repo root or services/control-plane.")]
    MigrationDirNotFound { tried: String, last_error: String },

    /// A uniqueness or optimistic-concurrency check failed.
    #[error("{0}")]
    Conflict(String),

    /// A write referenced a record that does not exist.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// A stored row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Maps a query error, translating Postgres constraint violations.
    ///
    /// `23505` (unique violation) becomes [`DbError::Conflict`] and `23503`
    /// (foreign key violation) becomes [`DbError::Integrity`].
    pub(crate) fn from_query(err: sqlx::Error, conflict: impl FnOnce() -> String) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            match db_err.code().as_deref() {
                Some("23505") => return Self::Conflict(conflict()),
                Some("23503") => return Self::Integrity(db_err.message().to_string()),
                _ => {}
            }
        }
        Self::Query(err)
    }
}
