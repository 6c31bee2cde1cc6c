use thiserror::Error;

/// Administrative errors surfaced synchronously to callers.
///
/// Check-execution failures are deliberately absent: a failed probe becomes a
/// failed `Event` row, never an error crossing the scheduler boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timing integrity violation: {0}")]
    Integrity(String),

    #[error("no connected worker available for dispatch")]
    NoConnectedWorker,

    #[error("invalid monitor address: {0}")]
    InvalidAddress(String),

    #[error("invalid cron expression: {0}")]
    InvalidCron(String),
}

impl ServiceError {
    pub fn monitor_not_found(id: i64) -> Self {
        Self::NotFound { what: "monitor", key: id.to_string() }
    }

    pub fn worker_not_found(uuid: uuid::Uuid) -> Self {
        Self::NotFound { what: "worker", key: uuid.to_string() }
    }
}
