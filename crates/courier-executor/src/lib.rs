//! `courier-executor` — dispatch from job kind to handling logic.
//!
//! Handlers implement [`registry::JobHandler`] and register with an
//! [`registry::ExecutorRegistry`] at startup; the set of kinds is fixed for
//! the process lifetime. Execution errors carry their retry classification
//! ([`error::ExecuteError::is_retryable`]), which is what the worker feeds
//! back into the queue's `fail` transition.

pub mod error;
pub mod registry;

pub use error::ExecuteError;
pub use registry::{ExecutorRegistry, JobHandler};
