use thiserror::Error;

/// Errors raised while executing a job.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// No handler is registered for the job's kind. Permanent: retrying
    /// cannot help because registration is fixed at startup.
    #[error("Unknown job kind: {kind}")]
    UnknownKind { kind: String },

    /// Transient failure (network, downstream outage). Eligible for retry.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Permanent failure (validation, malformed payload). Never retried.
    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl ExecuteError {
    /// Whether the worker should ask the queue to retry the job.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecuteError::Transient(_))
    }
}
