//! Conversation runtime executor

use super::{Command, ControllerEvent, Snapshot};
use crate::capability::Capability;
use crate::conversation::{transition, ConvState, Effect, Event, SendOutcome};
use crate::message::MessageStore;
use crate::session::{ModelError, SessionManager, SessionState};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// A finished send, handing the session manager back to the executor
struct SendCompletion<C: Capability> {
    manager: SessionManager<C>,
    outcome: SendOutcome,
}

/// Owns all conversation state and executes effects
pub struct ConversationController<C: Capability + 'static> {
    state: ConvState,
    store: MessageStore,
    /// `None` while a send task has it checked out
    manager: Option<SessionManager<C>>,
    /// Last observed session state, kept while the manager is checked out
    session_state: SessionState,
    input: String,
    error: Option<String>,
    command_rx: mpsc::Receiver<Command>,
    completion_tx: mpsc::Sender<SendCompletion<C>>,
    completion_rx: mpsc::Receiver<SendCompletion<C>>,
    broadcast_tx: broadcast::Sender<ControllerEvent>,
    /// Token to cancel the running send
    send_cancel_token: Option<CancellationToken>,
}

impl<C: Capability + 'static> ConversationController<C> {
    pub fn new(
        manager: SessionManager<C>,
        command_rx: mpsc::Receiver<Command>,
        broadcast_tx: broadcast::Sender<ControllerEvent>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(1);
        Self {
            state: ConvState::Idle,
            store: MessageStore::new(),
            session_state: manager.state(),
            manager: Some(manager),
            input: String::new(),
            error: None,
            command_rx,
            completion_tx,
            completion_rx,
            broadcast_tx,
            send_cancel_token: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Starting conversation controller");

        self.prepare_session().await;

        // Set once every handle is gone but a send still holds the session
        let mut draining = false;

        loop {
            tokio::select! {
                command = self.command_rx.recv(), if !draining => match command {
                    Some(command) => self.handle_command(command).await,
                    None if self.manager.is_some() => break,
                    None => {
                        tracing::info!("All handles dropped, waiting for the in-flight reply");
                        draining = true;
                    }
                },
                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion).await;
                    if draining && !self.state.is_loading() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Conversation controller stopped");
    }

    /// Check availability and create the first session up front
    async fn prepare_session(&mut self) {
        let Some(manager) = self.manager.as_mut() else {
            return;
        };

        let result = if manager.check_availability().await {
            manager.initialize_session(manager.relaxed_safety()).await
        } else {
            Err(ModelError::ModelUnavailable)
        };
        let session_state = manager.state();
        self.set_session_state(session_state);

        if let Err(error) = result {
            tracing::warn!(error = %error, "Model session not ready at startup");
            self.process_event(Event::StartupFailed { error }).await;
        }
    }

    async fn handle_command(&mut self, command: Command) {
        let event = match command {
            Command::Submit { text } => Event::Submit { text },
            Command::SetInput { text } => Event::SetInput { text },
            Command::SubmitInput => Event::Submit {
                text: self.input.clone(),
            },
            Command::Regenerate { message_id } => {
                let Some(message) = self.store.get(message_id).cloned() else {
                    self.reject(format!("Message {message_id} not found"));
                    return;
                };
                Event::Regenerate { message }
            }
            Command::RegenerateLatest => {
                if self.store.is_empty() {
                    self.reject("Conversation is empty".to_string());
                    return;
                }
                let Some(message) = self.store.last_regenerable().cloned() else {
                    self.reject("No reply to regenerate".to_string());
                    return;
                };
                Event::Regenerate { message }
            }
            Command::Clear => Event::Clear,
            Command::DismissError => Event::DismissError,
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                return;
            }
        };

        self.process_event(event).await;
    }

    async fn handle_completion(&mut self, completion: SendCompletion<C>) {
        let SendCompletion { manager, outcome } = completion;
        if let SendOutcome::Completed(Err(error)) = &outcome {
            tracing::warn!(error = %error, retryable = error.is_retryable(), "Send failed");
        }
        self.set_session_state(manager.state());
        self.manager = Some(manager);
        self.send_cancel_token = None;

        self.process_event(Event::SendFinished { outcome }).await;
    }

    async fn process_event(&mut self, event: Event) {
        let result = match transition(&self.state, event) {
            Ok(r) => r,
            Err(e) => {
                self.reject(e.to_string());
                return;
            }
        };

        let was_loading = self.state.is_loading();
        self.state = result.new_state;
        tracing::debug!(state = %self.state.type_name(), "Conversation state changed");

        for effect in result.effects {
            self.execute_effect(effect).await;
        }

        let loading = self.state.is_loading();
        if loading != was_loading {
            self.notify(ControllerEvent::LoadingChanged { loading });
        }
    }

    async fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::AppendMessage(message) => {
                let message = self.store.append(message).clone();
                tracing::debug!(role = ?message.role, count = self.store.len(), "Message appended");
                self.notify(ControllerEvent::MessageAppended { message });
            }

            Effect::ClearMessages => {
                let removed = self.store.clear();
                tracing::info!(removed, "Conversation cleared");
                self.notify(ControllerEvent::Cleared);
            }

            Effect::RequestModel { prompt } => self.start_send(prompt),

            Effect::CancelRequest => {
                if let Some(token) = &self.send_cancel_token {
                    token.cancel();
                }
            }

            Effect::ResetSession => {
                let Some(manager) = self.manager.as_mut() else {
                    tracing::error!("Session reset requested while a send holds the session");
                    return;
                };
                let state = manager.reset_session(manager.relaxed_safety()).await;
                self.set_session_state(state);
            }

            Effect::SetInput(text) => {
                if self.input != text {
                    self.input.clone_from(&text);
                    self.notify(ControllerEvent::InputChanged { input: text });
                }
            }

            Effect::SetError(message) => {
                self.error = Some(message.clone());
                self.notify(ControllerEvent::Error { message });
            }

            Effect::ClearError => {
                if self.error.take().is_some() {
                    self.notify(ControllerEvent::ErrorDismissed);
                }
            }
        }
    }

    /// Hand the session manager to a background task for the duration of
    /// one send
    fn start_send(&mut self, prompt: String) {
        let Some(mut manager) = self.manager.take() else {
            // The transition function only requests a send from Idle
            tracing::error!("Send requested while another send is in flight");
            return;
        };

        let token = CancellationToken::new();
        self.send_cancel_token = Some(token.clone());
        let completion_tx = self.completion_tx.clone();

        tracing::info!(prompt_chars = prompt.chars().count(), "Dispatching send");

        tokio::spawn(async move {
            let outcome = tokio::select! {
                result = manager.send_message(&prompt) => SendOutcome::Completed(result),
                () = token.cancelled() => {
                    tracing::info!("Send cancelled");
                    SendOutcome::Cancelled
                }
            };
            let _ = completion_tx.send(SendCompletion { manager, outcome }).await;
        });
    }

    fn set_session_state(&mut self, state: SessionState) {
        if self.session_state != state {
            self.session_state = state;
            self.notify(ControllerEvent::SessionChanged { state });
        }
    }

    fn reject(&self, reason: String) {
        tracing::debug!(reason = %reason, "Command rejected");
        self.notify(ControllerEvent::Rejected { reason });
    }

    fn notify(&self, event: ControllerEvent) {
        // No subscribers is fine
        let _ = self.broadcast_tx.send(event);
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            messages: self.store.messages().to_vec(),
            loading: self.state.is_loading(),
            error: self.error.clone(),
            input: self.input.clone(),
            session: self.session_state,
        }
    }
}
