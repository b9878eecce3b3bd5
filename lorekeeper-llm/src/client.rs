//! Model client contract and the llama.cpp server backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, CompletionTimings};

/// Anything that can turn a prompt into a completion.
///
/// Implementations should return [`LlmError::Cancelled`] when the request
/// was abandoned, so callers can tell it apart from a fault.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one completion.
    ///
    /// # Errors
    /// Returns an [`LlmError`] when the call fails or is cancelled.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Client for a llama.cpp-style `POST /completion` endpoint.
#[derive(Debug, Clone)]
pub struct LlamaServerClient {
    http: Client,
    base_url: String,
    timeout_ms: u64,
    max_retries: u32,
}

impl LlamaServerClient {
    /// Client for the server at `base_url` (e.g. `http://127.0.0.1:8080`).
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] for an empty URL or zero timeout.
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, LlmError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.trim().is_empty() {
            return Err(LlmError::ConfigError("base_url must not be empty".into()));
        }
        if timeout_ms == 0 {
            return Err(LlmError::ConfigError("timeout_ms must be positive".into()));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            timeout_ms,
            max_retries: 0,
        })
    }

    /// Retry connection failures up to `max_retries` extra times.
    ///
    /// Only transport errors are retried here; rejected content is the
    /// caller's concern.
    #[must_use]
    pub fn with_transport_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Server base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn body(request: &CompletionRequest) -> Value {
        let mut body = json!({
            "prompt": request.prompt,
            "stream": false,
            "cache_prompt": request.cache_prompt,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["n_predict"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(seed) = request.seed {
            body["seed"] = json!(seed);
        }
        if let Some(n_keep) = request.n_keep {
            body["n_keep"] = json!(n_keep);
        }
        body
    }

    async fn post_once(&self, url: &str, body: &Value) -> Result<CompletionResponse, LlmError> {
        let resp = self
            .http
            .post(url)
            .json(body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| match LlmError::from(e) {
                LlmError::Timeout(_) => LlmError::Timeout(self.timeout_ms),
                other => other,
            })?;

        if !resp.status().is_success() {
            return Err(LlmError::RequestFailed(format!("HTTP {}", resp.status())));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        parse_completion(&json)
    }
}

/// Read a llama.cpp completion body.
///
/// # Errors
/// Returns [`LlmError::ParseError`] when `content` is missing.
pub fn parse_completion(json: &Value) -> Result<CompletionResponse, LlmError> {
    let content = json["content"]
        .as_str()
        .ok_or_else(|| LlmError::ParseError(format!("missing `content` in response: {json}")))?
        .to_string();
    let count = |field: &str| u32::try_from(json[field].as_u64().unwrap_or(0)).unwrap_or(u32::MAX);

    let timings = json.get("timings").filter(|t| t.is_object()).map(|t| CompletionTimings {
        prompt_ms: t["prompt_ms"].as_f64().unwrap_or(0.0),
        predicted_ms: t["predicted_ms"].as_f64().unwrap_or(0.0),
    });

    Ok(CompletionResponse {
        content,
        prompt_token_count: count("tokens_evaluated"),
        generated_token_count: count("tokens_predicted"),
        cached_token_count: count("tokens_cached"),
        timings,
    })
}

#[async_trait]
impl ModelClient for LlamaServerClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/completion", self.base_url);
        let body = Self::body(request);

        let mut attempt = 0;
        loop {
            let start = Instant::now();
            match self.post_once(&url, &body).await {
                Ok(response) => {
                    debug!(
                        prompt_tokens = response.prompt_token_count,
                        generated_tokens = response.generated_token_count,
                        cached_tokens = response.cached_token_count,
                        latency_ms = start.elapsed().as_millis(),
                        "completion finished"
                    );
                    return Ok(response);
                }
                Err(LlmError::Unavailable(reason)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(%reason, attempt, max = self.max_retries, "model server unreachable, retrying");
                }
                Err(e) => {
                    warn!(error = %e, "completion failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_is_rejected() {
        assert!(matches!(LlamaServerClient::new("  ", 1000), Err(LlmError::ConfigError(_))));
        assert!(matches!(LlamaServerClient::new("http://x", 0), Err(LlmError::ConfigError(_))));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = LlamaServerClient::new("http://localhost:8080/", 1000).expect("valid");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn body_carries_cache_fields() {
        let request = CompletionRequest::new("System: hi")
            .with_max_tokens(64)
            .with_seed(Some(7))
            .with_cache(true, Some(12));
        let body = LlamaServerClient::body(&request);
        assert_eq!(body["prompt"], "System: hi");
        assert_eq!(body["n_predict"], 64);
        assert_eq!(body["seed"], 7);
        assert_eq!(body["cache_prompt"], true);
        assert_eq!(body["n_keep"], 12);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn parses_llama_server_response() {
        let json = json!({
            "content": "Well met.",
            "tokens_evaluated": 120,
            "tokens_predicted": 4,
            "tokens_cached": 100,
            "timings": { "prompt_ms": 12.5, "predicted_ms": 30.0 }
        });
        let response = parse_completion(&json).expect("parse");
        assert_eq!(response.content, "Well met.");
        assert_eq!(response.prompt_token_count, 120);
        assert_eq!(response.cached_token_count, 100);
        assert_eq!(response.timings.map(|t| t.prompt_ms), Some(12.5));
    }

    #[test]
    fn missing_content_is_parse_error() {
        let err = parse_completion(&json!({ "error": "boom" })).expect_err("no content");
        assert!(matches!(err, LlmError::ParseError(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable_or_timeout() {
        // Port 9 (discard) is closed on test machines.
        let client = LlamaServerClient::new("http://127.0.0.1:9", 500).expect("valid");
        let err = client
            .complete(&CompletionRequest::new("hi"))
            .await
            .expect_err("no server");
        assert!(matches!(
            err,
            LlmError::Unavailable(_) | LlmError::Timeout(_) | LlmError::RequestFailed(_)
        ));
    }
}
