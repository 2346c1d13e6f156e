//! Runtime for driving a conversation
//!
//! One executor task owns the transcript, the conversation state and the
//! session manager. Front ends talk to it through a [`ControllerHandle`]:
//! commands go in over an mpsc channel, state changes come back out as
//! [`ControllerEvent`]s on a broadcast channel.

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::ConversationController;

use crate::capability::Capability;
use crate::message::Message;
use crate::session::{SessionManager, SessionState};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

const COMMAND_BUFFER: usize = 32;
const BROADCAST_BUFFER: usize = 128;

/// Requests accepted by the controller
#[derive(Debug)]
pub enum Command {
    Submit { text: String },
    SetInput { text: String },
    /// Submit whatever is in the pending-input buffer
    SubmitInput,
    Regenerate { message_id: Uuid },
    /// Regenerate the most recent assistant reply
    RegenerateLatest,
    Clear,
    DismissError,
    Snapshot { reply: oneshot::Sender<Snapshot> },
}

/// State-change notifications for renderers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    MessageAppended { message: Message },
    Cleared,
    LoadingChanged { loading: bool },
    Error { message: String },
    ErrorDismissed,
    InputChanged { input: String },
    SessionChanged { state: SessionState },
    /// A command was refused; nothing changed
    Rejected { reason: String },
}

/// Everything a renderer needs to draw the conversation from scratch
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub messages: Vec<Message>,
    pub loading: bool,
    pub error: Option<String>,
    pub input: String,
    pub session: SessionState,
}

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("conversation controller has stopped")]
    Closed,
}

/// Handle to interact with a running conversation
#[derive(Clone)]
pub struct ControllerHandle {
    command_tx: mpsc::Sender<Command>,
}

impl ControllerHandle {
    async fn send(&self, command: Command) -> Result<(), HandleError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| HandleError::Closed)
    }

    pub async fn submit(&self, text: impl Into<String>) -> Result<(), HandleError> {
        self.send(Command::Submit { text: text.into() }).await
    }

    pub async fn set_input(&self, text: impl Into<String>) -> Result<(), HandleError> {
        self.send(Command::SetInput { text: text.into() }).await
    }

    pub async fn submit_input(&self) -> Result<(), HandleError> {
        self.send(Command::SubmitInput).await
    }

    pub async fn regenerate(&self, message_id: Uuid) -> Result<(), HandleError> {
        self.send(Command::Regenerate { message_id }).await
    }

    pub async fn regenerate_latest(&self) -> Result<(), HandleError> {
        self.send(Command::RegenerateLatest).await
    }

    pub async fn clear(&self) -> Result<(), HandleError> {
        self.send(Command::Clear).await
    }

    pub async fn dismiss_error(&self) -> Result<(), HandleError> {
        self.send(Command::DismissError).await
    }

    pub async fn snapshot(&self) -> Result<Snapshot, HandleError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| HandleError::Closed)
    }

}

/// Start a controller task for `manager`.
///
/// The returned receiver is subscribed before the task starts, so it sees
/// startup notifications too. The task runs until every handle has been
/// dropped and any in-flight send has delivered its reply.
pub fn spawn<C: Capability + 'static>(
    manager: SessionManager<C>,
) -> (
    ControllerHandle,
    broadcast::Receiver<ControllerEvent>,
    JoinHandle<()>,
) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (broadcast_tx, events) = broadcast::channel(BROADCAST_BUFFER);

    let controller = ConversationController::new(manager, command_rx, broadcast_tx);
    let join = tokio::spawn(controller.run());

    (ControllerHandle { command_tx }, events, join)
}
