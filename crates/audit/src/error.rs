//! Audit errors

use thiserror::Error;
use tranche_core::ErrorKind;

/// Errors from the audit store, worker and sweeper
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt audit row {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuditError::Config(_) => ErrorKind::Validation,
            _ => ErrorKind::Unknown,
        }
    }
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors from pushing an event to the external sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    #[error("Sink rejected event {event_id}: {reason}")]
    Rejected { event_id: String, reason: String },

    #[error("Sink push timed out after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SinkError {
    /// Every sink failure is an upstream failure from the engine's point of view
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UpstreamUnavailable
    }
}
