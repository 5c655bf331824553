//! Per-key Gemini `generateContent` client
//!
//! One `GeminiClient` exists per API key in the pool. The underlying
//! `reqwest::Client` (connection pool, timeout) is shared between all of them;
//! only the key differs. Failures are reported as `provider::UpstreamError`
//! with the HTTP status and the API's own `error.status` folded into the
//! message, which is what the rate-limit classifier inspects.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common::Secret;
use provider::{GenerativeClient, UpstreamError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{API_KEY_HEADER, API_VERSION};

/// Gemini client bound to a single API key.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    api_key: Secret<String>,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.hint())
            .finish()
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// `{"error": {"code": 429, "message": "...", "status": "RESOURCE_EXHAUSTED"}}`
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

impl GeminiClient {
    /// Build a client for `api_key` against `base_url` (no trailing path).
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            api_key: Secret::new(api_key.to_string()),
        }
    }

    /// Redacted key identifier for logs.
    pub fn key_hint(&self) -> String {
        self.api_key.hint()
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/{API_VERSION}/models/{model}:generateContent",
            self.base_url
        )
    }

    /// Send `prompt` to `model` and return the concatenated text of the first
    /// candidate.
    pub async fn generate_content(&self, model: &str, prompt: &str) -> provider::Result<String> {
        let body = GenerateContentRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(self.endpoint(model))
            .header(API_KEY_HEADER, self.api_key.expose().as_str())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(api_error(status, &body));
        }

        let parsed = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| UpstreamError::new(format!("invalid generateContent response: {e}")))?;

        debug!(model, key_hint = %self.key_hint(), "generateContent succeeded");
        extract_text(parsed)
    }
}

impl GenerativeClient for GeminiClient {
    fn id(&self) -> &str {
        "gemini"
    }

    fn generate_text<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = provider::Result<String>> + Send + 'a>> {
        Box::pin(self.generate_content(model, prompt))
    }
}

fn transport_error(e: reqwest::Error) -> UpstreamError {
    let message = if e.is_timeout() {
        format!("request to Gemini timed out: {e}")
    } else {
        format!("request to Gemini failed: {e}")
    };
    UpstreamError {
        status: e.status().map(|s| s.as_u16()),
        message,
    }
}

/// Build an upstream error from a non-2xx response.
///
/// Message shape: `429 Too Many Requests: [RESOURCE_EXHAUSTED] Resource has been exhausted`.
/// Bodies that are not the API's JSON error envelope are included raw.
fn api_error(status: reqwest::StatusCode, body: &str) -> UpstreamError {
    let (code, message) = match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(ApiErrorEnvelope { error }) => {
            let detail = error.message.unwrap_or_default();
            let message = match error.status {
                Some(api_status) => format!("{status}: [{api_status}] {detail}"),
                None => format!("{status}: {detail}"),
            };
            let code = error.code.filter(|c| *c != 0).unwrap_or(status.as_u16());
            (code, message)
        }
        Err(_) => (status.as_u16(), format!("{status}: {body}")),
    };
    UpstreamError::with_status(code, message.trim_end().to_string())
}

fn extract_text(response: GenerateContentResponse) -> provider::Result<String> {
    let text: Option<String> = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        });

    match text {
        Some(t) => Ok(t),
        None => match response.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => Err(UpstreamError::new(format!("prompt blocked: {reason}"))),
            None => Err(UpstreamError::new("response contained no candidates")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use tokio::net::TcpListener;

    /// Start a mock Gemini endpoint that answers every request with `status` and `body`,
    /// echoing the received API key and prompt back when `body` is `None`.
    async fn start_mock(status: StatusCode, body: Option<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let app = axum::Router::new().fallback(
                move |headers: HeaderMap, uri: axum::http::Uri, payload: String| async move {
                    let reply = match body {
                        Some(b) => b.to_string(),
                        None => {
                            let request: serde_json::Value = serde_json::from_str(&payload).unwrap();
                            let key = headers
                                .get(API_KEY_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("");
                            let prompt = request["contents"][0]["parts"][0]["text"]
                                .as_str()
                                .unwrap_or("");
                            serde_json::json!({
                                "candidates": [{
                                    "content": {"parts": [
                                        {"text": format!("{} ", uri.path())},
                                        {"text": format!("{key}|{prompt}")}
                                    ]}
                                }]
                            })
                            .to_string()
                        }
                    };
                    (status, reply)
                },
            );
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn generate_content_sends_key_header_and_prompt() {
        let base = start_mock(StatusCode::OK, None).await;
        let client = GeminiClient::new(reqwest::Client::new(), &base, "AIza-test-key");

        let text = client
            .generate_content("gemini-2.5-flash", "write a haiku")
            .await
            .unwrap();

        assert_eq!(
            text,
            "/v1beta/models/gemini-2.5-flash:generateContent AIza-test-key|write a haiku"
        );
    }

    #[tokio::test]
    async fn rate_limit_response_keeps_status_and_api_status() {
        let base = start_mock(
            StatusCode::TOO_MANY_REQUESTS,
            Some(r#"{"error":{"code":429,"message":"Resource has been exhausted (e.g. check quota).","status":"RESOURCE_EXHAUSTED"}}"#),
        )
        .await;
        let client = GeminiClient::new(reqwest::Client::new(), &base, "k1");

        let err = client.generate_content("gemini-2.5-flash", "p").await.unwrap_err();
        assert_eq!(err.status, Some(429));
        assert!(err.message.contains("RESOURCE_EXHAUSTED"), "got: {}", err.message);
        assert!(err.message.contains("Resource has been exhausted"), "got: {}", err.message);
    }

    #[tokio::test]
    async fn invalid_key_response_is_reported_with_status() {
        let base = start_mock(
            StatusCode::BAD_REQUEST,
            Some(r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#),
        )
        .await;
        let client = GeminiClient::new(reqwest::Client::new(), &base, "bad");

        let err = client.generate_content("gemini-2.5-flash", "p").await.unwrap_err();
        assert_eq!(err.status, Some(400));
        assert!(err.message.contains("API key not valid"), "got: {}", err.message);
    }

    #[tokio::test]
    async fn non_json_error_body_is_included_raw() {
        let base = start_mock(StatusCode::BAD_GATEWAY, Some("upstream connect error")).await;
        let client = GeminiClient::new(reqwest::Client::new(), &base, "k");

        let err = client.generate_content("gemini-2.5-flash", "p").await.unwrap_err();
        assert_eq!(err.status, Some(502));
        assert!(err.message.contains("upstream connect error"), "got: {}", err.message);
    }

    #[tokio::test]
    async fn blocked_prompt_is_an_error() {
        let base = start_mock(
            StatusCode::OK,
            Some(r#"{"candidates":[],"promptFeedback":{"blockReason":"SAFETY"}}"#),
        )
        .await;
        let client = GeminiClient::new(reqwest::Client::new(), &base, "k");

        let err = client.generate_content("gemini-2.5-flash", "p").await.unwrap_err();
        assert_eq!(err.status, None);
        assert_eq!(err.message, "prompt blocked: SAFETY");
    }

    #[tokio::test]
    async fn dead_upstream_is_transport_error_without_status() {
        let client = GeminiClient::new(reqwest::Client::new(), "http://127.0.0.1:1", "k");

        let err = client.generate_content("gemini-2.5-flash", "p").await.unwrap_err();
        assert_eq!(err.status, None);
        assert!(err.message.starts_with("request to Gemini failed"), "got: {}", err.message);
    }

    #[test]
    fn debug_output_redacts_key() {
        let client = GeminiClient::new(reqwest::Client::new(), "https://example.test/", "AIzaSecretValue");
        let debug = format!("{client:?}");
        assert!(!debug.contains("AIzaSecretValue"));
        assert!(debug.contains("…alue"));
        assert!(debug.contains("https://example.test\""), "trailing slash trimmed: {debug}");
    }
}
