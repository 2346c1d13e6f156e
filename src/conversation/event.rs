//! Events that can occur in a conversation

use crate::message::Message;
use crate::session::{ModelError, ModelResponse};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    Submit { text: String },
    SetInput { text: String },
    Regenerate { message: Message },
    Clear,
    DismissError,

    // Model events
    SendFinished { outcome: SendOutcome },

    /// The session could not be prepared when the controller started
    StartupFailed { error: ModelError },
}

/// How an in-flight send ended
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Completed(Result<ModelResponse, ModelError>),
    Cancelled,
}
