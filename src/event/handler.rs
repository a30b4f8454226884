use async_trait::async_trait;
use thiserror::Error;

use super::events::Msg;

/// Errors that can occur when handling client messages
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        HandlerError::Failed(msg.into())
    }
}

/// Trait for components that react to messages sent by clients
///
/// The bus calls handlers one message at a time, in the order messages were
/// enqueued, so a handler never runs concurrently with itself or with any
/// other handler registered on the same bus. Failures are logged by the bus
/// and do not stop delivery of later messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, msg: &Msg) -> Result<(), HandlerError>;

    /// Get a human-readable name for this handler (for logging/debugging)
    fn name(&self) -> &'static str;
}

