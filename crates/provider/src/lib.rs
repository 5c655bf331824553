//! Provider abstraction for upstream generation APIs
//!
//! Defines the `GenerativeClient` trait that decouples the key pool from the
//! concrete HTTP client. The Gemini client implements it per API key; tests
//! implement it with scripted fakes. Errors crossing this seam carry exactly
//! what the rate-limit classifier inspects: a message and, when the upstream
//! supplied one, a numeric status code.

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Classification of upstream errors to determine the failover strategy.
///
/// - RateLimited rotates to the next key in the pool
/// - Fatal is surfaced to the caller immediately, no retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClassification {
    /// Quota or throughput rejection, try another key
    RateLimited,
    /// Anything else: auth, malformed request, network, server error
    Fatal,
}

impl ErrorClassification {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClassification::RateLimited => "rate_limited",
            ErrorClassification::Fatal => "fatal",
        }
    }
}

/// A failed call to the upstream generation API.
///
/// `status` is the HTTP (or API-level) status code when one was available;
/// transport failures such as timeouts and refused connections have none.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamError {
    /// Error without a status code (transport or decoding failure).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Error reported by the upstream with a status code.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

/// Result alias for upstream calls.
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// A client bound to a single credential, able to run text generation.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn GenerativeClient>`).
pub trait GenerativeClient: Send + Sync {
    /// Identifier for logging (e.g. "gemini")
    fn id(&self) -> &str;

    /// Send `prompt` to `model` and return the text completion.
    fn generate_text<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl GenerativeClient for Echo {
        fn id(&self) -> &str {
            "echo"
        }

        fn generate_text<'a>(
            &'a self,
            model: &'a str,
            prompt: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
            Box::pin(async move { Ok(format!("{model}: {prompt}")) })
        }
    }

    #[test]
    fn upstream_error_displays_message_verbatim() {
        let err = UpstreamError::with_status(400, "API key not valid. Please pass a valid API key.");
        assert_eq!(err.to_string(), "API key not valid. Please pass a valid API key.");
        assert_eq!(err.status, Some(400));
    }

    #[test]
    fn upstream_error_without_status() {
        let err = UpstreamError::new("connection refused");
        assert_eq!(err.status, None);
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn classification_labels() {
        assert_eq!(ErrorClassification::RateLimited.label(), "rate_limited");
        assert_eq!(ErrorClassification::Fatal.label(), "fatal");
    }

    #[tokio::test]
    async fn trait_is_dyn_compatible() {
        let client: std::sync::Arc<dyn GenerativeClient> = std::sync::Arc::new(Echo);
        let text = client.generate_text("gemini-2.5-flash", "hello").await.unwrap();
        assert_eq!(text, "gemini-2.5-flash: hello");
        assert_eq!(client.id(), "echo");
    }
}
