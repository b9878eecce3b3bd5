//! Completion request and response types.

use serde::{Deserialize, Serialize};

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Full prompt text (static prefix followed by dynamic suffix).
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Sampling seed.
    pub seed: Option<i64>,
    /// Ask the server to reuse its prompt cache.
    pub cache_prompt: bool,
    /// Prompt tokens the server should keep when its context overflows.
    pub n_keep: Option<usize>,
}

impl CompletionRequest {
    /// Request for `prompt` with server defaults and prompt caching on.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
            seed: None,
            cache_prompt: true,
            n_keep: None,
        }
    }

    /// Set the generation limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the sampling seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Option<i64>) -> Self {
        self.seed = seed;
        self
    }

    /// Set prompt caching and the number of prefix tokens to keep.
    #[must_use]
    pub fn with_cache(mut self, cache_prompt: bool, n_keep: Option<usize>) -> Self {
        self.cache_prompt = cache_prompt;
        self.n_keep = n_keep;
        self
    }
}

/// Server-side timings, all in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionTimings {
    /// Time spent evaluating the prompt.
    pub prompt_ms: f64,
    /// Time spent generating tokens.
    pub predicted_ms: f64,
}

/// Result of a completion call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text.
    pub content: String,
    /// Prompt tokens evaluated by the server.
    pub prompt_token_count: u32,
    /// Tokens generated.
    pub generated_token_count: u32,
    /// Prompt tokens served from the server's cache.
    pub cached_token_count: u32,
    /// Server timings, when reported.
    pub timings: Option<CompletionTimings>,
}

impl CompletionResponse {
    /// Response with only `content` set.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}
