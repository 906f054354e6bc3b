use thiserror::Error;

/// Errors that can occur within the queue subsystem.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Underlying SQLite / rusqlite error. Covers the store-unavailable case:
    /// callers that can wait (scheduler, workers) log and retry later.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The payload could not be (de)serialised.
    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No such job, or the job is not currently leased by the caller.
    /// Safe to ignore on the worker side: the lease raced away.
    #[error("Job not found: {id}")]
    NotFound { id: String },

    /// The job description is malformed (empty kind, oversized payload).
    #[error("Invalid job: {0}")]
    InvalidJob(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
