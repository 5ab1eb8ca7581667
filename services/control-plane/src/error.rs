//! Error types surfaced by the orchestration core.

use armada_id::IdError;
use thiserror::Error;

use crate::db::DbError;
use crate::scheduler::SchedulerError;

/// Result type for core operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the orchestration core.
///
/// Callers decide what to do from the variant:
/// - `Validation`: bad input, never retried.
/// - `Conflict`: an optimistic-concurrency check lost; recompute and retry.
/// - `NotFound`: a referenced record or job is absent.
/// - `Indeterminate`: a scheduler call timed out and its effect is unknown;
///   re-query job states before acting again.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("scheduler outcome unknown: {0}")]
    Indeterminate(String),

    #[error("scheduler error: {0}")]
    Scheduler(#[source] SchedulerError),

    #[error("store error: {0}")]
    Store(#[source] DbError),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Returns true if the caller should recompute and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true if the effect of the failed call is unknown.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Indeterminate(_))
    }
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(message) => Self::Conflict(message),
            // Every referenced record hangs off an app and is only ever
            // removed with it.
            DbError::Integrity(message) => Self::not_found("app", message),
            other => Self::Store(other),
        }
    }
}

impl From<SchedulerError> for Error {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::NotFound(job_id) => Self::not_found("job", job_id),
            other => Self::Scheduler(other),
        }
    }
}

impl From<IdError> for Error {
    fn from(err: IdError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_becomes_retryable_conflict() {
        let err: Error = DbError::Conflict("formation for web-app moved".into()).into();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_store_integrity_violation_is_missing_app() {
        let err: Error = DbError::Integrity("app 'web-app' does not exist".into()).into();
        assert!(matches!(err, Error::NotFound { kind: "app", .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_scheduler_not_found_maps_to_not_found() {
        let err: Error = SchedulerError::NotFound("web-app.v1.web.0".into()).into();
        assert!(matches!(err, Error::NotFound { kind: "job", .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_id_error_is_validation() {
        let err: Error = IdError::Empty.into();
        assert!(matches!(err, Error::Validation(_)));
    }
}
