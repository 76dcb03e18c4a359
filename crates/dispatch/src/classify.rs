//! Failure classification for upstream call errors
//!
//! Distinguishes rejected keys (rotate immediately), rate limits (rotate or
//! back off), and provider outages (back off on the same pool) from
//! everything else (abort). Classification is pure string and status
//! matching; the same failure always classifies the same way.

use provider::CallFailure;

/// Message patterns that mark a rejected API key.
///
/// These phrases appear in provider error bodies when the key itself is
/// bad, as opposed to the key being throttled or the service being down.
const INVALID_KEY_PATTERNS: &[&str] = &["api_key_invalid", "invalid api key", "api key not valid"];

/// Rate-limit message patterns, checked when the status is not a literal 429.
const RATE_LIMIT_PATTERNS: &[&str] = &["429", "quota", "resource_exhausted"];

/// Outage message patterns, checked when the status is not already 5xx.
const UNAVAILABLE_PATTERNS: &[&str] = &["503", "unavailable"];

/// Classified upstream failure, in decision order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedError {
    /// The provider rejected this key outright; exclude it and reselect.
    InvalidKey,
    /// Rate limit or quota pressure; rotate keys, or back off when alone.
    RateLimited {
        /// Upstream hint in seconds, when the message carried one.
        retry_after: Option<f64>,
    },
    /// Provider outage; back off and retry without touching the pool.
    Unavailable,
    /// Unrecognized failure; abort the dispatch.
    Fatal,
}

/// Classify a call failure by HTTP status and message text.
///
/// Invalid-key markers win over rate-limit markers, which win over outage
/// markers. The message is checked case-insensitively regardless of the
/// status, so a 400 whose body says "API key not valid" still rotates.
pub fn classify(failure: &CallFailure) -> ClassifiedError {
    let lower = failure.message.to_lowercase();

    if contains_any(&lower, INVALID_KEY_PATTERNS) {
        return ClassifiedError::InvalidKey;
    }

    if failure.status == Some(429) || contains_any(&lower, RATE_LIMIT_PATTERNS) {
        return ClassifiedError::RateLimited {
            retry_after: retry_hint_seconds(&lower),
        };
    }

    if failure.status.is_some_and(|s| s >= 500) || contains_any(&lower, UNAVAILABLE_PATTERNS) {
        return ClassifiedError::Unavailable;
    }

    ClassifiedError::Fatal
}

fn contains_any(lower: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|pattern| lower.contains(pattern))
}

/// Extract a retry hint from text like "Please retry in 58.75s".
///
/// Accepts only a finite, non-negative number immediately followed by the
/// `s` unit; anything else yields no hint. `lower` must already be
/// lowercased.
fn retry_hint_seconds(lower: &str) -> Option<f64> {
    let start = lower.find("retry in ")? + "retry in ".len();
    let rest = &lower[start..];
    let number: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if number.is_empty() || !rest[number.len()..].starts_with('s') {
        return None;
    }
    let seconds: f64 = number.parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(seconds)
    } else {
        None
    }
}
