//! Completion client for the chat-completions API.
//!
//! The pipeline only sees the [`CompletionClient`] trait, so tests can
//! swap the HTTP client for a deterministic stub.

use crate::config::ApiConfig;
use crate::error::{Result, SheetQaError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::trace;

/// System prompt sent with every question.
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that provides clear and concise answers.";

/// Marker the API puts in quota-exhaustion errors.
const QUOTA_MARKER: &str = "insufficient_quota";

/// Error bodies longer than this are truncated.
const MAX_ERROR_BODY: usize = 500;

/// A successful completion and how long the call took.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Text content of the model's reply.
    pub text: String,
    /// Wall-clock time of the call.
    pub duration: Duration,
}

impl Completion {
    /// Create a completion.
    pub fn new(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            text: text.into(),
            duration,
        }
    }
}

/// Why a single completion call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Network error, rate limit, timeout or server error. Worth retrying.
    #[error("{0}")]
    Transient(String),

    /// The account is out of quota. Retrying cannot help.
    #[error("{0}")]
    QuotaExhausted(String),

    /// Any other rejection (bad request, auth, ...). Not retried.
    #[error("{0}")]
    Other(String),
}

impl Fault {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify an error description returned by the API or transport.
    ///
    /// Quota detection is a substring match on the error text.
    pub fn classify(status: Option<StatusCode>, message: String) -> Self {
        if message.contains(QUOTA_MARKER) {
            return Self::QuotaExhausted(message);
        }
        match status {
            None => Self::Transient(message),
            Some(s)
                if s == StatusCode::TOO_MANY_REQUESTS
                    || s == StatusCode::REQUEST_TIMEOUT
                    || s.is_server_error() =>
            {
                Self::Transient(message)
            }
            Some(_) => Self::Other(message),
        }
    }
}

/// Something that can answer one question.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Perform one completion call for `question`.
    async fn complete(&self, question: &str) -> std::result::Result<Completion, Fault>;
}

/// HTTP client for OpenAI-compatible chat-completions endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiClient {
    /// Create a new client from API settings.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(SheetQaError::MissingApiKey)?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Build the request body for a question.
    pub fn build_body(&self, question: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": question }
            ],
            "max_tokens": self.max_tokens
        })
    }

    async fn send_once(&self, question: &str) -> std::result::Result<String, Fault> {
        trace!(endpoint = %self.endpoint, "Sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.build_body(question))
            .send()
            .await
            .map_err(|e| Fault::classify(e.status(), format!("Request failed: {e}")))?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Fault::classify(
                Some(status),
                format!("HTTP {}: {}", status.as_u16(), truncate(&body)),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Fault::Transient(format!("Failed to parse response: {e}")))?;

        extract_content(&body).ok_or_else(|| {
            Fault::Transient(format!(
                "Response missing message content: {}",
                truncate(&body.to_string())
            ))
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, question: &str) -> std::result::Result<Completion, Fault> {
        let start = Instant::now();
        let text = self.send_once(question).await?;
        Ok(Completion::new(text, start.elapsed()))
    }
}

/// Pull `choices[0].message.content` out of a response body.
fn extract_content(body: &Value) -> Option<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn truncate(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY {
        let cut = body
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= MAX_ERROR_BODY)
            .last()
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::retry::RetryPolicy;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_config(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            api_key: Some("sk-test".to_string()),
            ..ApiConfig::default()
        }
    }

    #[test]
    fn test_missing_api_key() {
        let config = ApiConfig {
            api_key: None,
            ..ApiConfig::default()
        };
        assert!(matches!(
            OpenAiClient::new(&config),
            Err(SheetQaError::MissingApiKey)
        ));
    }

    #[test]
    fn test_build_body() {
        let client = OpenAiClient::new(&api_config("http://localhost")).unwrap();
        let body = client.build_body("What is Rust?");

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 150);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["content"], "What is Rust?");
    }

    #[test]
    fn test_classify() {
        assert!(matches!(
            Fault::classify(Some(StatusCode::TOO_MANY_REQUESTS), "slow down".into()),
            Fault::Transient(_)
        ));
        assert!(matches!(
            Fault::classify(
                Some(StatusCode::TOO_MANY_REQUESTS),
                "{\"code\":\"insufficient_quota\"}".into()
            ),
            Fault::QuotaExhausted(_)
        ));
        assert!(matches!(
            Fault::classify(Some(StatusCode::BAD_GATEWAY), "oops".into()),
            Fault::Transient(_)
        ));
        assert!(matches!(
            Fault::classify(Some(StatusCode::UNAUTHORIZED), "bad key".into()),
            Fault::Other(_)
        ));
        assert!(matches!(
            Fault::classify(None, "connection reset".into()),
            Fault::Transient(_)
        ));
    }

    #[test]
    fn test_truncate_long_body() {
        let long = "é".repeat(400);
        let cut = truncate(&long);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= MAX_ERROR_BODY + 3);
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-4o-mini" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Paris." } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&api_config(&server.uri())).unwrap();
        let completion = client.complete("Capital of France?").await.unwrap();
        assert_eq!(completion.text, "Paris.");
    }

    #[tokio::test]
    async fn test_complete_quota_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "type": "insufficient_quota", "message": "You exceeded your current quota" }
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&api_config(&server.uri())).unwrap();
        let fault = client.complete("q").await.unwrap_err();
        assert!(matches!(fault, Fault::QuotaExhausted(_)));
        assert!(!fault.is_retryable());
    }

    #[tokio::test]
    async fn test_complete_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&api_config(&server.uri())).unwrap();
        let fault = client.complete("q").await.unwrap_err();
        assert_eq!(fault, Fault::Transient("HTTP 503: overloaded".to_string()));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Second time lucky." } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&api_config(&server.uri())).unwrap();
        let outcome = RetryPolicy::new(RetryConfig::immediate(3))
            .run(&client, "q")
            .await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result.unwrap().text, "Second time lucky.");
    }

    #[tokio::test]
    async fn test_retry_stops_on_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&api_config(&server.uri())).unwrap();
        let outcome = RetryPolicy::new(RetryConfig::immediate(3))
            .run(&client, "q")
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            outcome.result,
            Err(Fault::Other("HTTP 401: invalid api key".to_string()))
        );
    }

    #[tokio::test]
    async fn test_complete_missing_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&api_config(&server.uri())).unwrap();
        assert!(matches!(
            client.complete("q").await,
            Err(Fault::Transient(_))
        ));
    }
}
