//! Line-oriented terminal front end
//!
//! Reads prompts from stdin and prints controller notifications to stdout.
//! Logs go to stderr so the two streams can be separated.

use crate::message::{Message, Role};
use crate::runtime::{ControllerEvent, ControllerHandle, HandleError};
use crate::session::SessionState;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Prompt(String),
    Clear,
    /// Regenerate the reply at this transcript position, or the latest one
    Regenerate(Option<usize>),
    Dismiss,
    Quit,
    Help,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if let Some(arg) = trimmed.strip_prefix("/regen ") {
            return arg
                .trim()
                .parse()
                .map_or(Input::Help, |position| Input::Regenerate(Some(position)));
        }
        match trimmed {
            "/regen" => Input::Regenerate(None),
            "/clear" => Input::Clear,
            "/dismiss" => Input::Dismiss,
            "/quit" | "/exit" => Input::Quit,
            "/help" => Input::Help,
            _ => Input::Prompt(line.to_string()),
        }
    }
}

const HELP: &str = "commands: /clear  /regen [n]  /dismiss  /quit";

/// Turns notifications into console lines, numbering transcript entries
/// so `/regen <n>` can refer to them
#[derive(Debug, Default)]
pub struct Printer {
    position: usize,
}

impl Printer {
    /// Text to print for a notification, if any
    pub fn render(&mut self, event: &ControllerEvent) -> Option<String> {
        match event {
            ControllerEvent::MessageAppended { message } => {
                self.position += 1;
                match message.role {
                    // The user just typed it
                    Role::User => None,
                    Role::Assistant => Some(render_reply(self.position, message)),
                }
            }
            ControllerEvent::Cleared => {
                self.position = 0;
                Some("-- conversation cleared --".to_string())
            }
            ControllerEvent::LoadingChanged { loading: true } => Some("...".to_string()),
            ControllerEvent::Error { message } => {
                Some(format!("! {message} (/dismiss to hide)"))
            }
            ControllerEvent::SessionChanged {
                state: SessionState::NoSession,
            } => Some("-- model session closed --".to_string()),
            ControllerEvent::Rejected { reason } => Some(format!("? {reason}")),
            ControllerEvent::LoadingChanged { loading: false }
            | ControllerEvent::ErrorDismissed
            | ControllerEvent::InputChanged { .. }
            | ControllerEvent::SessionChanged { .. } => None,
        }
    }
}

fn render_reply(position: usize, message: &Message) -> String {
    match &message.metrics {
        Some(m) => format!(
            "[{position}] {}\n   [{:.2}s, ~{} tokens, {:.1} tok/s]",
            message.text, m.response_time_seconds, m.output_token_estimate, m.tokens_per_second
        ),
        None => format!("[{position}] {}", message.text),
    }
}

/// Print notifications until the controller stops
async fn print_events(mut events: broadcast::Receiver<ControllerEvent>) {
    let mut printer = Printer::default();
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Ok(json) = serde_json::to_string(&event) {
                    tracing::debug!(event = %json, "Controller event");
                }
                if let Some(text) = printer.render(&event) {
                    println!("{text}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Console fell behind controller events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Resolve a 1-based transcript position to a regenerate command
async fn regenerate_at(handle: &ControllerHandle, position: usize) -> Result<(), HandleError> {
    let snapshot = handle.snapshot().await?;
    match position.checked_sub(1).and_then(|i| snapshot.messages.get(i)) {
        Some(message) => handle.regenerate(message.id).await,
        None => {
            println!("? no message at position {position}");
            Ok(())
        }
    }
}

/// Drive the controller from stdin until EOF or `/quit`.
///
/// `events` must be the receiver returned by `runtime::spawn`. Returns once
/// the controller has stopped and every notification has been printed.
pub async fn run(
    handle: ControllerHandle,
    events: broadcast::Receiver<ControllerEvent>,
) -> Result<(), HandleError> {
    let printer = tokio::spawn(print_events(events));
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                break;
            }
        };

        match Input::parse(&line) {
            Input::Prompt(text) => {
                handle.set_input(text).await?;
                handle.submit_input().await?;
            }
            Input::Clear => handle.clear().await?,
            Input::Regenerate(None) => handle.regenerate_latest().await?,
            Input::Regenerate(Some(position)) => regenerate_at(&handle, position).await?,
            Input::Dismiss => handle.dismiss_error().await?,
            Input::Help => println!("{HELP}"),
            Input::Quit => break,
        }
    }

    // The controller finishes any in-flight reply once the last handle is
    // gone; the printer exits when it stops.
    drop(handle);
    if let Err(e) = printer.await {
        tracing::error!(error = %e, "Console printer failed");
    }
    Ok(())
}
