//! Response timing and throughput estimates

use crate::message::ResponseMetrics;
use std::time::Duration;

const CHARS_PER_TOKEN: u64 = 3;

/// Rough output token count: one token per three characters, never zero.
pub fn estimate_output_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    (chars / CHARS_PER_TOKEN).max(1)
}

/// Throughput in tokens per second; zero for a non-positive duration.
#[allow(clippy::cast_precision_loss)] // token counts stay far below 2^52
pub fn tokens_per_second(tokens: u64, response_time_seconds: f64) -> f64 {
    if response_time_seconds > 0.0 {
        tokens as f64 / response_time_seconds
    } else {
        0.0
    }
}

pub fn measure(text: &str, elapsed: Duration) -> ResponseMetrics {
    let response_time_seconds = elapsed.as_secs_f64();
    let output_token_estimate = estimate_output_tokens(text);
    ResponseMetrics {
        response_time_seconds,
        output_token_estimate,
        tokens_per_second: tokens_per_second(output_token_estimate, response_time_seconds),
    }
}
