//! Model session manager
//!
//! Owns the single session handle to the inference capability. The handle is
//! created lazily, replaced wholesale on reset, and dropped whenever the
//! capability reports unsafe content so a poisoned context never leaks into
//! the next turn.

mod error;
pub mod metrics;

pub use error::ModelError;

use crate::capability::{Capability, CapabilityError};
use crate::message::ResponseMetrics;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Whether a session handle is currently held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoSession,
    Ready,
}

/// Successful reply with its measurements
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub metrics: ResponseMetrics,
}

pub struct SessionManager<C: Capability> {
    capability: C,
    session: Option<C::Session>,
    /// Flag used when a send has to create the session itself
    relaxed_safety: bool,
    response_timeout: Option<Duration>,
}

impl<C: Capability> SessionManager<C> {
    pub fn new(capability: C) -> Self {
        Self {
            capability,
            session: None,
            relaxed_safety: true,
            response_timeout: None,
        }
    }

    pub fn with_relaxed_safety(mut self, relaxed_safety: bool) -> Self {
        self.relaxed_safety = relaxed_safety;
        self
    }

    /// Bound every `respond` call. A hung capability otherwise blocks the
    /// conversation forever.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.has_session() {
            SessionState::Ready
        } else {
            SessionState::NoSession
        }
    }

    pub fn relaxed_safety(&self) -> bool {
        self.relaxed_safety
    }

    /// True when the platform supports the capability and it is usable now
    pub async fn check_availability(&self) -> bool {
        self.capability.is_supported() && self.capability.availability().await.is_available()
    }

    /// Acquire a new session, discarding any prior one
    pub async fn initialize_session(&mut self, relaxed_safety: bool) -> Result<(), ModelError> {
        if !self.check_availability().await {
            return Err(ModelError::ModelUnavailable);
        }

        self.session = None;
        self.relaxed_safety = relaxed_safety;
        let session = self
            .capability
            .create_session(relaxed_safety)
            .await
            .map_err(|e| ModelError::ResponseError(e.message))?;
        self.session = Some(session);

        tracing::debug!(capability = %self.capability.name(), relaxed_safety, "Session ready");
        Ok(())
    }

    /// Drop the current session and eagerly create a replacement.
    ///
    /// On failure the manager is left without a session; the next send
    /// retries initialization.
    pub async fn reset_session(&mut self, relaxed_safety: bool) -> SessionState {
        self.session = None;
        if let Err(e) = self.initialize_session(relaxed_safety).await {
            tracing::warn!(error = %e, "Session reset could not create a replacement");
        }
        self.state()
    }

    pub async fn send_message(&mut self, text: &str) -> Result<ModelResponse, ModelError> {
        if self.session.is_none() {
            self.initialize_session(self.relaxed_safety).await?;
        }
        let session = self
            .session
            .as_mut()
            .ok_or(ModelError::SessionNotInitialized)?;

        let start = Instant::now();
        let outcome = match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, self.capability.respond(session, text))
                .await
                .unwrap_or_else(|_| {
                    Err(CapabilityError::network(format!(
                        "model did not respond within {}s",
                        limit.as_secs()
                    )))
                }),
            None => self.capability.respond(session, text).await,
        };

        match outcome {
            Ok(reply) => {
                let metrics = metrics::measure(&reply.content, start.elapsed());
                Ok(ModelResponse {
                    text: reply.content,
                    metrics,
                })
            }
            Err(e) => {
                if e.is_unsafe_content() {
                    tracing::warn!(error = %e.message, "Unsafe content reported, discarding session");
                    self.session = None;
                }
                Err(ModelError::ResponseError(e.message))
            }
        }
    }
}
