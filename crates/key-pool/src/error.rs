//! Error types for pool invocations

use provider::UpstreamError;

/// Errors surfaced to callers of the pool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pool holds no keys; nothing was sent upstream.
    #[error("API key not set: add at least one Gemini API key")]
    NotConfigured,

    /// Every key was tried and every attempt was rate limited.
    #[error("all {attempts} API keys are rate limited; last error: {last_message}")]
    RateLimitExhausted { attempts: usize, last_message: String },

    /// First non-rate-limit failure, unmodified.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl Error {
    /// Stable label for logs, metrics and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotConfigured => "not_configured",
            Error::RateLimitExhausted { .. } => "rate_limit_exhausted",
            Error::Upstream(_) => "upstream_error",
        }
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_message_names_count_and_last_error() {
        let err = Error::RateLimitExhausted {
            attempts: 3,
            last_message: "429 Too Many Requests".into(),
        };
        assert_eq!(
            err.to_string(),
            "all 3 API keys are rate limited; last error: 429 Too Many Requests"
        );
        assert_eq!(err.kind(), "rate_limit_exhausted");
    }

    #[test]
    fn upstream_is_transparent() {
        let err = Error::from(UpstreamError::with_status(400, "API key not valid"));
        assert_eq!(err.to_string(), "API key not valid");
        assert_eq!(err.kind(), "upstream_error");
    }
}
