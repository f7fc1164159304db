use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid job status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome classification for a single dispatch attempt. Transient failures
/// follow the bounded-retry path; permanent ones fail the job immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Transient dispatch failure: {0}")]
    Transient(String),

    #[error("Permanent dispatch failure: {0}")]
    Permanent(String),
}
