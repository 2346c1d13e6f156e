//! Capability backed by an on-device OpenAI-compatible inference server
//! (llama.cpp server, Ollama, LM Studio) listening on loopback.
//!
//! These servers are stateless per request, so the session carries the
//! transcript and replays it on every call.

use super::{Availability, Capability, CapabilityError, Reply};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const STRICT_INSTRUCTIONS: &str = "You are a helpful assistant running on the user's device.";
const RELAXED_INSTRUCTIONS: &str = "You are a helpful assistant running on the user's device. \
Long-form writing, fiction and literary analysis may involve mature themes; engage with them \
thoughtfully instead of refusing.";

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct LocalCapability {
    client: Client,
    base_url: Option<Url>,
    model: String,
}

/// Transcript replayed to the server on each turn
#[derive(Debug, Clone)]
pub struct LocalSession {
    messages: Vec<ChatMessage>,
    relaxed_safety: bool,
}

impl LocalSession {
    fn new(relaxed_safety: bool) -> Self {
        let instructions = if relaxed_safety {
            RELAXED_INSTRUCTIONS
        } else {
            STRICT_INSTRUCTIONS
        };
        Self {
            messages: vec![ChatMessage::new("system", instructions)],
            relaxed_safety,
        }
    }

    pub fn relaxed_safety(&self) -> bool {
        self.relaxed_safety
    }

    /// Number of completed user/assistant exchanges
    pub fn turns(&self) -> usize {
        self.messages.iter().filter(|m| m.role == "assistant").count()
    }

    fn request_messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = self.messages.clone();
        messages.push(ChatMessage::new("user", prompt));
        messages
    }

    fn record_exchange(&mut self, prompt: &str, reply: &str) {
        self.messages.push(ChatMessage::new("user", prompt));
        self.messages.push(ChatMessage::new("assistant", reply));
    }
}

impl LocalCapability {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, CapabilityError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CapabilityError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: parse_base_url(endpoint),
            model: model.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<String, CapabilityError> {
        let base = self
            .base_url
            .as_ref()
            .ok_or_else(|| CapabilityError::unavailable("No inference endpoint configured"))?;
        Ok(format!("{}/v1/{path}", base.as_str().trim_end_matches('/')))
    }

    fn build_request(&self, session: &LocalSession, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: session.request_messages(prompt),
            stream: false,
        }
    }
}

/// Accept `http(s)://host:port`, tolerating a trailing `/v1`.
fn parse_base_url(endpoint: &str) -> Option<Url> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/v1").unwrap_or(trimmed);
    let url = Url::parse(trimmed).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn map_transport_error(e: &reqwest::Error) -> CapabilityError {
    if e.is_timeout() {
        CapabilityError::network(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        CapabilityError::network(format!("Connection failed: {e}"))
    } else {
        CapabilityError::unknown(format!("Request failed: {e}"))
    }
}

fn map_status_error(status: reqwest::StatusCode, body: &str) -> CapabilityError {
    let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(body) else {
        return CapabilityError::unknown(format!("HTTP {status} error: {body}"));
    };
    let message = error_resp.error.message;
    match status.as_u16() {
        400 | 422 if is_filter_message(&message) => {
            CapabilityError::guardrail(format!("Unsafe content rejected: {message}"))
        }
        400 | 422 => CapabilityError::invalid_request(format!("Invalid request: {message}")),
        404 | 503 => CapabilityError::unavailable(format!("Model not loaded: {message}")),
        500..=599 => CapabilityError::server_error(format!("Server error: {message}")),
        _ => CapabilityError::unknown(format!("HTTP {status}: {message}")),
    }
}

fn is_filter_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("content_filter") || lowered.contains("content filter")
}

fn normalize_response(resp: ChatResponse) -> Result<Reply, CapabilityError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CapabilityError::unknown("No choices in response"))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(CapabilityError::guardrail(
            "Unsafe content detected: reply withheld by content filter",
        ));
    }

    let text = choice.message.content.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(CapabilityError::unknown("Model returned an empty reply"));
    }
    Ok(Reply::new(text))
}

#[async_trait]
impl Capability for LocalCapability {
    type Session = LocalSession;

    fn is_supported(&self) -> bool {
        self.base_url.is_some()
    }

    async fn availability(&self) -> Availability {
        let url = match self.endpoint("models") {
            Ok(url) => url,
            Err(e) => return Availability::Unavailable(e.message),
        };

        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(resp) if resp.status().is_success() => Availability::Available,
            Ok(resp) => Availability::Unavailable(format!("{url} returned HTTP {}", resp.status())),
            Err(e) => Availability::Unavailable(map_transport_error(&e).message),
        }
    }

    async fn create_session(&self, relaxed_safety: bool) -> Result<LocalSession, CapabilityError> {
        if !self.is_supported() {
            return Err(CapabilityError::unavailable("No inference endpoint configured"));
        }
        Ok(LocalSession::new(relaxed_safety))
    }

    async fn respond(
        &self,
        session: &mut LocalSession,
        prompt: &str,
    ) -> Result<Reply, CapabilityError> {
        let url = self.endpoint("chat/completions")?;
        let request = self.build_request(session, prompt);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(map_status_error(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            CapabilityError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        let reply = normalize_response(parsed)?;
        session.record_exchange(prompt, &reply.content);
        tracing::debug!(
            turns = session.turns(),
            relaxed_safety = session.relaxed_safety(),
            "Exchange recorded"
        );
        Ok(reply)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}
