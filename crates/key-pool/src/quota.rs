//! Rate-limit detection for upstream errors
//!
//! Gemini reports quota and throughput rejections in several shapes: an HTTP
//! 429, an API status of `RESOURCE_EXHAUSTED`, or only a human-readable message
//! when the failure is relayed by an intermediary. Matching is deliberately
//! kept in this one module so the retry loop never inspects messages itself.

use provider::{ErrorClassification, UpstreamError};

/// Status code that always means "rate limited".
const RATE_LIMIT_STATUS: u16 = 429;

/// Message fragments (lowercase) that mark a rate-limit failure.
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "quota exceeded",
    "resource exhausted",
    "429",
    "too many requests",
];

/// Classify an upstream failure by status code and message.
///
/// Rate limited when `status` is 429 or the message contains any of
/// [`RATE_LIMIT_PATTERNS`], case-insensitively. Underscores in the message are
/// read as spaces so API status names (`RESOURCE_EXHAUSTED`) match too.
/// Everything else, including timeouts and auth failures, is `Fatal`.
pub fn classify(status: Option<u16>, message: &str) -> ErrorClassification {
    if status == Some(RATE_LIMIT_STATUS) {
        return ErrorClassification::RateLimited;
    }
    let normalized = message.to_lowercase().replace('_', " ");
    if RATE_LIMIT_PATTERNS.iter().any(|p| normalized.contains(p)) {
        return ErrorClassification::RateLimited;
    }
    ErrorClassification::Fatal
}

/// Classify an [`UpstreamError`].
pub fn classify_error(error: &UpstreamError) -> ErrorClassification {
    classify(error.status, &error.message)
}
