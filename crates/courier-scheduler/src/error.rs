use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The queue store rejected an enqueue.
    #[error("Queue error: {0}")]
    Queue(#[from] courier_queue::QueueError),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
