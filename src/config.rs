//! Environment-driven configuration

use std::time::Duration;
use thiserror::Error;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080";
const DEFAULT_MODEL: &str = "local";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Which inference backend to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Echo,
    Local,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: unknown capability '{value}' (expected 'echo' or 'local')")]
    UnknownCapability { var: &'static str, value: String },
    #[error("{var}: expected a boolean, got '{value}'")]
    InvalidBool { var: &'static str, value: String },
    #[error("{var}: expected a whole number of seconds, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub capability: CapabilityKind,
    pub endpoint: String,
    pub model: String,
    pub relaxed_safety: bool,
    /// `None` disables the response timeout
    pub response_timeout: Option<Duration>,
    pub echo_unsafe_words: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            capability: CapabilityKind::Echo,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            relaxed_safety: true,
            response_timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            echo_unsafe_words: Vec::new(),
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset and empty variables
    /// fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(value) = get("MURMUR_CAPABILITY") {
            config.capability = match value.to_lowercase().as_str() {
                "echo" => CapabilityKind::Echo,
                "local" => CapabilityKind::Local,
                _ => {
                    return Err(ConfigError::UnknownCapability {
                        var: "MURMUR_CAPABILITY",
                        value,
                    })
                }
            };
        }

        if let Some(endpoint) = get("MURMUR_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(model) = get("MURMUR_MODEL") {
            config.model = model;
        }

        if let Some(value) = get("MURMUR_RELAXED_SAFETY") {
            config.relaxed_safety = parse_bool("MURMUR_RELAXED_SAFETY", value)?;
        }

        if let Some(value) = get("MURMUR_TIMEOUT_SECS") {
            let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidNumber {
                var: "MURMUR_TIMEOUT_SECS",
                value: value.clone(),
            })?;
            config.response_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(words) = get("MURMUR_ECHO_UNSAFE_WORDS") {
            config.echo_unsafe_words = words
                .split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}
