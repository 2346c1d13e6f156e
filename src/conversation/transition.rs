//! Pure state transition function
//!
//! Given the same state and event this always produces the same new state
//! and effects (message ids and timestamps aside). All I/O happens in the
//! runtime executor.

use super::{ConvState, Effect, Event, SendOutcome};
use crate::message::{Message, Role};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Commands the conversation refuses in its current state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A reply is still being generated, wait for it to finish")]
    Busy,
    #[error("Cannot regenerate: {0}")]
    NotRegenerable(&'static str),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(state: &ConvState, event: Event) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Submission
        // ============================================================

        // Blank input is ignored in every state
        (_, Event::Submit { text }) if text.trim().is_empty() => {
            Ok(TransitionResult::new(state.clone()))
        }

        (ConvState::Idle, Event::Submit { text }) => {
            let prompt = text.trim().to_string();
            Ok(TransitionResult::new(ConvState::Sending {
                prompt: prompt.clone(),
            })
            .with_effect(Effect::AppendMessage(Message::user(prompt.clone())))
            .with_effect(Effect::clear_input())
            .with_effect(Effect::request_model(prompt)))
        }

        // One send at a time
        (ConvState::Sending { .. } | ConvState::Clearing, Event::Submit { .. }) => {
            Err(TransitionError::Busy)
        }

        (_, Event::SetInput { text }) => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::SetInput(text)))
        }

        // ============================================================
        // Regeneration
        // ============================================================

        (ConvState::Sending { .. } | ConvState::Clearing, Event::Regenerate { .. }) => {
            Err(TransitionError::Busy)
        }

        (ConvState::Idle, Event::Regenerate { message }) => {
            if message.role != Role::Assistant {
                return Err(TransitionError::NotRegenerable("only replies can be regenerated"));
            }
            let Some(prompt) = message.original_prompt else {
                return Err(TransitionError::NotRegenerable("reply has no originating prompt"));
            };
            Ok(TransitionResult::new(ConvState::Sending {
                prompt: prompt.clone(),
            })
            .with_effect(Effect::request_model(prompt)))
        }

        // ============================================================
        // Clearing
        // ============================================================

        (ConvState::Idle, Event::Clear) => Ok(TransitionResult::new(ConvState::Idle)
            .with_effect(Effect::ClearMessages)
            .with_effect(Effect::ResetSession)),

        // The reset waits until the cancelled request returns the session
        (ConvState::Sending { .. }, Event::Clear) => Ok(TransitionResult::new(ConvState::Clearing)
            .with_effect(Effect::ClearMessages)
            .with_effect(Effect::CancelRequest)),

        (ConvState::Clearing, Event::Clear) => {
            Ok(TransitionResult::new(ConvState::Clearing).with_effect(Effect::ClearMessages))
        }

        // ============================================================
        // Send completion
        // ============================================================

        (ConvState::Sending { prompt }, Event::SendFinished { outcome }) => match outcome {
            SendOutcome::Completed(Ok(response)) => Ok(TransitionResult::new(ConvState::Idle)
                .with_effect(Effect::AppendMessage(Message::reply(
                    response.text,
                    response.metrics,
                    prompt.clone(),
                )))),
            SendOutcome::Completed(Err(error)) => {
                let description = error.to_string();
                Ok(TransitionResult::new(ConvState::Idle)
                    .with_effect(Effect::SetError(description.clone()))
                    .with_effect(Effect::AppendMessage(Message::failure(
                        &description,
                        prompt.clone(),
                    ))))
            }
            SendOutcome::Cancelled => Ok(TransitionResult::new(ConvState::Idle)),
        },

        // Whatever arrived belongs to the cleared conversation
        (ConvState::Clearing, Event::SendFinished { .. }) => {
            Ok(TransitionResult::new(ConvState::Idle).with_effect(Effect::ResetSession))
        }

        (ConvState::Idle, Event::SendFinished { .. }) => Err(TransitionError::InvalidTransition(
            "send finished while idle".to_string(),
        )),

        // ============================================================
        // Alerts
        // ============================================================

        (_, Event::DismissError) => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::ClearError))
        }

        (_, Event::StartupFailed { error }) => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::SetError(error.to_string())))
        }
    }
}
