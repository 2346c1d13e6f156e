//! Capability error types

use thiserror::Error;

/// Failure reported by the inference capability, with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CapabilityError {
    pub kind: CapabilityErrorKind,
    pub message: String,
}

impl CapabilityError {
    pub fn new(kind: CapabilityErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Unavailable, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Network, message)
    }

    pub fn guardrail(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Guardrail, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Server, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Unknown, message)
    }

    /// Whether this failure means the session's context may be poisoned.
    ///
    /// Providers do not agree on a structured signal for safety rejections,
    /// so a description mentioning "unsafe" counts as well as an explicit
    /// guardrail classification.
    pub fn is_unsafe_content(&self) -> bool {
        self.kind == CapabilityErrorKind::Guardrail
            || self.message.to_lowercase().contains("unsafe")
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityErrorKind {
    /// Capability missing or disabled on this device
    Unavailable,
    /// Transport failures, timeouts
    Network,
    /// Safety guardrail rejected the prompt or the generated reply
    Guardrail,
    /// Server-side failure (5xx)
    Server,
    /// Malformed request (400)
    InvalidRequest,
    /// Anything else
    Unknown,
}
