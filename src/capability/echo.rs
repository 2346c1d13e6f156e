//! Offline capability that echoes prompts back prefixed with `[echo]`.
//!
//! Used when no inference server is configured, and for exercising the
//! full send path without a model.

use super::{Availability, Capability, CapabilityError, Reply};
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct EchoCapability {
    /// Prompts containing any of these words are rejected as unsafe
    unsafe_words: Vec<String>,
}

/// Session state for the echo capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoSession {
    pub turns: u32,
    pub relaxed_safety: bool,
}

impl EchoCapability {
    pub fn new(unsafe_words: Vec<String>) -> Self {
        Self {
            unsafe_words: unsafe_words
                .into_iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    fn trips_guardrail(&self, prompt: &str) -> bool {
        let lowered = prompt.to_lowercase();
        self.unsafe_words.iter().any(|w| lowered.contains(w.as_str()))
    }
}

#[async_trait]
impl Capability for EchoCapability {
    type Session = EchoSession;

    fn is_supported(&self) -> bool {
        true
    }

    async fn availability(&self) -> Availability {
        Availability::Available
    }

    async fn create_session(&self, relaxed_safety: bool) -> Result<EchoSession, CapabilityError> {
        Ok(EchoSession {
            turns: 0,
            relaxed_safety,
        })
    }

    async fn respond(
        &self,
        session: &mut EchoSession,
        prompt: &str,
    ) -> Result<Reply, CapabilityError> {
        if self.trips_guardrail(prompt) {
            return Err(CapabilityError::guardrail("Unsafe content detected"));
        }
        session.turns += 1;
        tracing::debug!(
            turns = session.turns,
            relaxed_safety = session.relaxed_safety,
            "Echoing prompt"
        );
        Ok(Reply::new(format!("[echo] {prompt}")))
    }

    fn name(&self) -> &str {
        "echo"
    }
}
