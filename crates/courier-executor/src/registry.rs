use std::collections::HashMap;

use async_trait::async_trait;
use courier_core::types::JobPayload;
use tracing::debug;

use crate::error::ExecuteError;

/// Handling logic for one job kind.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, payload: &JobPayload) -> Result<(), ExecuteError>;
}

/// Maps a kind tag to its handler.
///
/// Populated once at startup, looked up at dispatch time. No dynamic
/// registration after that; the worker treats an unknown kind as a
/// permanent job failure, not a reason to wait.
#[derive(Default)]
pub struct ExecutorRegistry {
    handlers: HashMap<String, Box<dyn JobHandler>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous registration.
    pub fn register(&mut self, kind: impl Into<String>, handler: Box<dyn JobHandler>) {
        let kind = kind.into();
        debug!(%kind, "job handler registered");
        self.handlers.insert(kind, handler);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Dispatch a payload to the handler registered for `kind`.
    pub async fn execute(&self, kind: &str, payload: &JobPayload) -> Result<(), ExecuteError> {
        let handler = self
            .handlers
            .get(kind)
            .ok_or_else(|| ExecuteError::UnknownKind {
                kind: kind.to_string(),
            })?;
        handler.execute(payload).await
    }
}
