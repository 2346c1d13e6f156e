//! Session manager error types

use thiserror::Error;

/// Errors surfaced by the model session manager
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Capability absent or disabled; retrying is pointless until the
    /// environment changes
    #[error("The on-device model is not available. Make sure it is installed and enabled.")]
    ModelUnavailable,
    /// Internal invariant violation
    #[error("Model session is not initialized")]
    SessionNotInitialized,
    /// The capability failed on a specific call
    #[error("Model failed to respond: {0}")]
    ResponseError(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::ResponseError(_))
    }
}
