//! Inference capability abstraction
//!
//! The on-device model is an external collaborator. Everything in this crate
//! reaches it through the four operations of [`Capability`], so the session
//! manager can be exercised against mock implementations.

mod echo;
mod error;
mod local;

pub use echo::EchoCapability;
pub use error::CapabilityError;
pub use local::LocalCapability;

use async_trait::async_trait;
use std::sync::Arc;

/// Text produced by a single `respond` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
}

impl Reply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Readiness reported by the capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Boundary to the inference service
#[async_trait]
pub trait Capability: Send + Sync {
    /// Provider-held conversational context. Opaque to callers.
    type Session: Send + Sync + 'static;

    /// Whether this platform can host the capability at all
    fn is_supported(&self) -> bool;

    /// Whether the capability is usable right now
    async fn availability(&self) -> Availability;

    /// Acquire a fresh session
    async fn create_session(&self, relaxed_safety: bool) -> Result<Self::Session, CapabilityError>;

    /// Generate a reply to `prompt` within `session`'s context
    async fn respond(
        &self,
        session: &mut Self::Session,
        prompt: &str,
    ) -> Result<Reply, CapabilityError>;

    /// Human-readable name for logs
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: Capability + ?Sized> Capability for Arc<T> {
    type Session = T::Session;

    fn is_supported(&self) -> bool {
        (**self).is_supported()
    }

    async fn availability(&self) -> Availability {
        (**self).availability().await
    }

    async fn create_session(&self, relaxed_safety: bool) -> Result<Self::Session, CapabilityError> {
        (**self).create_session(relaxed_safety).await
    }

    async fn respond(
        &self,
        session: &mut Self::Session,
        prompt: &str,
    ) -> Result<Reply, CapabilityError> {
        (**self).respond(session, prompt).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Logging wrapper for capabilities
pub struct LoggingCapability<C> {
    inner: C,
}

impl<C: Capability> LoggingCapability<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: Capability> Capability for LoggingCapability<C> {
    type Session = C::Session;

    fn is_supported(&self) -> bool {
        self.inner.is_supported()
    }

    async fn availability(&self) -> Availability {
        let availability = self.inner.availability().await;
        if let Availability::Unavailable(reason) = &availability {
            tracing::warn!(capability = %self.inner.name(), reason = %reason, "Capability unavailable");
        }
        availability
    }

    async fn create_session(&self, relaxed_safety: bool) -> Result<Self::Session, CapabilityError> {
        let result = self.inner.create_session(relaxed_safety).await;
        match &result {
            Ok(_) => {
                tracing::info!(capability = %self.inner.name(), relaxed_safety, "Session created");
            }
            Err(e) => {
                tracing::error!(
                    capability = %self.inner.name(),
                    error = %e.message,
                    "Session creation failed"
                );
            }
        }
        result
    }

    async fn respond(
        &self,
        session: &mut Self::Session,
        prompt: &str,
    ) -> Result<Reply, CapabilityError> {
        let start = std::time::Instant::now();
        let result = self.inner.respond(session, prompt).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    capability = %self.inner.name(),
                    duration_ms = %duration.as_millis(),
                    prompt_chars = prompt.chars().count(),
                    reply_chars = reply.content.chars().count(),
                    "Model request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    capability = %self.inner.name(),
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    unsafe_content = e.is_unsafe_content(),
                    "Model request failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
