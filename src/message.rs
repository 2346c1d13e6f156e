//! Conversation transcript
//!
//! Append-only: messages are never edited or removed individually. The only
//! destructive operation is [`MessageStore::clear`], which drops everything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Timing and throughput measured for one model reply
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    pub response_time_seconds: f64,
    pub output_token_estimate: u64,
    pub tokens_per_second: f64,
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Present on successful model replies
    #[serde(flatten)]
    pub metrics: Option<ResponseMetrics>,
    /// The user text this assistant message answers; enables regeneration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_prompt: Option<String>,
}

impl Message {
    fn new(role: Role, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text,
            timestamp: Utc::now(),
            metrics: None,
            original_prompt: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into())
    }

    /// Successful model reply to `prompt`
    pub fn reply(text: impl Into<String>, metrics: ResponseMetrics, prompt: impl Into<String>) -> Self {
        Self {
            metrics: Some(metrics),
            original_prompt: Some(prompt.into()),
            ..Self::new(Role::Assistant, text.into())
        }
    }

    /// Inline transcript entry for a failed send of `prompt`
    pub fn failure(error: &str, prompt: impl Into<String>) -> Self {
        Self {
            original_prompt: Some(prompt.into()),
            ..Self::new(Role::Assistant, format!("Error: {error}"))
        }
    }

    pub fn is_regenerable(&self) -> bool {
        self.role == Role::Assistant && self.original_prompt.is_some()
    }
}

/// Ordered log of conversation turns
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Drop every message. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.messages.len();
        self.messages.clear();
        removed
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Most recent assistant message that can be regenerated
    pub fn last_regenerable(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_regenerable())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
