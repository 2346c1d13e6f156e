//! Murmur - terminal chat client for an on-device language model
//!
//! A conversation controller drives a single model session and keeps the
//! transcript; the console renders it line by line.

mod capability;
mod config;
mod console;
mod conversation;
mod message;
mod runtime;
mod session;

use capability::{Capability, EchoCapability, LocalCapability, LoggingCapability};
use config::{CapabilityKind, ChatConfig};
use session::SessionManager;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Per-request ceiling for the HTTP client when no response timeout is set
const HTTP_FALLBACK_TIMEOUT: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging. stdout belongs to the conversation.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ChatConfig::from_env()?;
    tracing::info!(
        capability = ?config.capability,
        relaxed_safety = config.relaxed_safety,
        timeout_secs = config.response_timeout.map(|t| t.as_secs()),
        "Configuration loaded"
    );

    match config.capability {
        CapabilityKind::Echo => {
            let echo = EchoCapability::new(config.echo_unsafe_words.clone());
            run_console(LoggingCapability::new(echo), &config).await
        }
        CapabilityKind::Local => {
            let local = LocalCapability::new(
                &config.endpoint,
                config.model.clone(),
                config.response_timeout.unwrap_or(HTTP_FALLBACK_TIMEOUT),
            )?;
            if !local.is_supported() {
                tracing::warn!(endpoint = %config.endpoint, "Endpoint is not a valid http(s) URL");
            }
            tracing::info!(endpoint = %config.endpoint, model = %config.model, "Using local inference server");
            run_console(LoggingCapability::new(local), &config).await
        }
    }
}

async fn run_console<C: Capability + 'static>(
    capability: C,
    config: &ChatConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut manager = SessionManager::new(capability).with_relaxed_safety(config.relaxed_safety);
    if let Some(timeout) = config.response_timeout {
        manager = manager.with_response_timeout(timeout);
    }

    let (handle, events, join) = runtime::spawn(manager);
    console::run(handle, events).await?;
    join.await?;
    Ok(())
}
