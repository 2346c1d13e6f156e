//! Effects produced by state transitions

use crate::message::Message;

/// Effects to be executed after a state transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append to the transcript
    AppendMessage(Message),

    /// Empty the transcript
    ClearMessages,

    /// Dispatch a send to the session manager
    RequestModel { prompt: String },

    /// Abort the in-flight send
    CancelRequest,

    /// Replace the model session
    ResetSession,

    /// Replace the pending-input buffer
    SetInput(String),

    /// Raise a user-facing alert
    SetError(String),

    /// Dismiss the alert
    ClearError,
}

impl Effect {
    pub fn request_model(prompt: impl Into<String>) -> Self {
        Effect::RequestModel {
            prompt: prompt.into(),
        }
    }

    pub fn clear_input() -> Self {
        Effect::SetInput(String::new())
    }
}
