//! Configuration for the lorekeeper pipeline.
//!
//! Maps directly to `lorekeeper.toml`. Every section and field has a
//! default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::{LoreError, Result};
use crate::prompt::{KvCacheConfig, PromptAssemblerConfig};
use crate::validation::RetryPolicy;
use crate::working_memory::WorkingMemoryConfig;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LorekeeperConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Memory store behavior.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Context retrieval caps and filters.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Working-memory budget.
    #[serde(default)]
    pub working_memory: WorkingMemoryConfig,
    /// Prompt text layout.
    #[serde(default)]
    pub prompt: PromptAssemblerConfig,
    /// Prefix caching.
    #[serde(default)]
    pub kv_cache: KvCacheConfig,
    /// Validation retry loop.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Model collaborator settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Memory persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl LorekeeperConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`LoreError::Config`] if the TOML is invalid or a value is
    /// out of range.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| LoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check cross-field ranges that serde cannot express.
    ///
    /// # Errors
    /// Returns [`LoreError::Config`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        self.memory
            .validate()
            .map_err(|e| LoreError::Config(e.to_string()))?;
        if !(self.prompt.chars_per_token.is_finite() && self.prompt.chars_per_token > 0.0) {
            return Err(LoreError::Config(format!(
                "prompt.chars_per_token must be positive, got {}",
                self.prompt.chars_per_token
            )));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_episodic_strength)
            || !(0.0..=1.0).contains(&self.retrieval.min_belief_confidence)
        {
            return Err(LoreError::Config(
                "retrieval thresholds must lie in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Memory store behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Fraction of significance lost per decay tick, in `[0, 1]`.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f32,
    /// Episodic capacity; the weakest, oldest entry is pruned beyond it.
    #[serde(default = "default_500")]
    pub max_episodic_memories: usize,
}

impl MemoryConfig {
    /// Reject out-of-range values.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`] when the decay rate is outside
    /// `[0, 1]` or the capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.decay_rate) {
            return Err(LoreError::invalid(
                "decay_rate",
                format!("must lie in [0, 1], got {}", self.decay_rate),
            ));
        }
        if self.max_episodic_memories == 0 {
            return Err(LoreError::invalid("max_episodic_memories", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            decay_rate: default_decay_rate(),
            max_episodic_memories: 500,
        }
    }
}

/// Context retrieval caps and filters.
///
/// Filters run before scoring; caps run after sorting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum canonical facts returned.
    #[serde(default = "default_10")]
    pub max_canonical_facts: usize,
    /// Maximum world-state entries returned.
    #[serde(default = "default_10")]
    pub max_world_state: usize,
    /// Maximum episodic memories returned.
    #[serde(default = "default_5")]
    pub max_episodic_memories: usize,
    /// Maximum beliefs returned.
    #[serde(default = "default_5")]
    pub max_beliefs: usize,
    /// Episodic memories weaker than this are never returned.
    #[serde(default = "default_0_1")]
    pub min_episodic_strength: f32,
    /// Beliefs less confident than this are never returned.
    #[serde(default = "default_0_2")]
    pub min_belief_confidence: f32,
    /// Whether contradicted beliefs may be returned.
    #[serde(default)]
    pub include_contradicted_beliefs: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_canonical_facts: 10,
            max_world_state: 10,
            max_episodic_memories: 5,
            max_beliefs: 5,
            min_episodic_strength: 0.1,
            min_belief_confidence: 0.2,
            include_contradicted_beliefs: false,
        }
    }
}

/// Model collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the completion server.
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    /// Maximum tokens to generate per attempt.
    #[serde(default = "default_256")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Fixed sampling seed, if any.
    #[serde(default)]
    pub seed: Option<i64>,
    /// Hard timeout for a single completion call in milliseconds.
    #[serde(default = "default_10000")]
    pub request_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            max_tokens: 256,
            temperature: default_temperature(),
            seed: None,
            request_timeout_ms: 10_000,
        }
    }
}

/// Memory persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable WAL journal mode for file databases.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Store and verify a CRC-32 of each saved row.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_llm_url() -> String { "http://127.0.0.1:8080".to_string() }
fn default_decay_rate() -> f32 { 0.05 }
fn default_temperature() -> f32 { 0.7 }
fn default_0_1() -> f32 { 0.1 }
fn default_0_2() -> f32 { 0.2 }
fn default_5() -> usize { 5 }
fn default_10() -> usize { 10 }
fn default_256() -> u32 { 256 }
fn default_500() -> usize { 500 }
fn default_10000() -> u64 { 10_000 }
