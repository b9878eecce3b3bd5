//! KV-cache prefix/suffix split.
//!
//! The model server can reuse its KV cache for any prompt prefix it has
//! already seen. The assembler therefore orders cache-eligible sections
//! first and cuts the prompt at a [`CacheBoundary`].

use std::fmt;

use serde::{Deserialize, Serialize};

use super::SectionBreakdown;

/// Where the static prefix ends. Later boundaries cache more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBoundary {
    /// Only the system prompt is cached.
    AfterSystemPrompt,
    /// System prompt and canonical facts.
    AfterCanonicalFacts,
    /// Adds world state.
    AfterWorldState,
    /// Adds the constraints block.
    AfterConstraints,
}

impl CacheBoundary {
    /// Every boundary, earliest first.
    pub const ALL: [Self; 4] = [
        Self::AfterSystemPrompt,
        Self::AfterCanonicalFacts,
        Self::AfterWorldState,
        Self::AfterConstraints,
    ];
}

impl fmt::Display for CacheBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AfterSystemPrompt => "after_system_prompt",
            Self::AfterCanonicalFacts => "after_canonical_facts",
            Self::AfterWorldState => "after_world_state",
            Self::AfterConstraints => "after_constraints",
        };
        write!(f, "{name}")
    }
}

/// Prefix caching settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvCacheConfig {
    /// Split the prompt and ask the server to cache the prefix.
    pub enable_caching: bool,
    /// Cut point.
    pub boundary: CacheBoundary,
    /// Record cache statistics per NPC.
    pub track_metrics: bool,
    /// Tokens the server should keep on context overflow. Advisory only;
    /// `None` leaves the choice to the caller.
    pub n_keep_tokens: Option<usize>,
}

impl Default for KvCacheConfig {
    fn default() -> Self {
        Self {
            enable_caching: true,
            boundary: CacheBoundary::AfterCanonicalFacts,
            track_metrics: true,
            n_keep_tokens: None,
        }
    }
}

impl KvCacheConfig {
    /// Cache through world state.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            boundary: CacheBoundary::AfterWorldState,
            ..Self::default()
        }
    }

    /// No split, no metrics.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enable_caching: false,
            track_metrics: false,
            ..Self::default()
        }
    }
}

/// A prompt split into a cacheable prefix and a per-request suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPrompt {
    /// Cache-eligible text. Empty when caching is disabled.
    pub static_prefix: String,
    /// Everything after the boundary.
    pub dynamic_suffix: String,
    /// Boundary that was applied.
    pub boundary: CacheBoundary,
    /// Whether caching was enabled.
    pub caching_enabled: bool,
    /// `static_prefix + dynamic_suffix`.
    pub full_prompt: String,
    /// Tokens in the prefix.
    pub estimated_static_tokens: usize,
    /// Tokens in the suffix.
    pub estimated_dynamic_tokens: usize,
    /// Sum of the two estimates.
    pub estimated_total_tokens: usize,
    /// Characters in the prefix.
    pub static_prefix_char_count: usize,
    /// Characters in the suffix.
    pub dynamic_suffix_char_count: usize,
    /// Characters in the full prompt.
    pub total_char_count: usize,
    /// Copied from [`KvCacheConfig::n_keep_tokens`].
    pub n_keep_tokens: Option<usize>,
    /// Per-section character counts of the full prompt.
    pub breakdown: SectionBreakdown,
}

impl CachedPrompt {
    /// Fraction of estimated tokens that sit in the prefix.
    #[must_use]
    pub fn cache_ratio(&self) -> f64 {
        if self.estimated_total_tokens == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.estimated_static_tokens as f64 / self.estimated_total_tokens as f64;
        ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_ordered() {
        assert!(CacheBoundary::AfterSystemPrompt < CacheBoundary::AfterCanonicalFacts);
        assert!(CacheBoundary::AfterCanonicalFacts < CacheBoundary::AfterWorldState);
        assert!(CacheBoundary::AfterWorldState < CacheBoundary::AfterConstraints);
    }

    #[test]
    fn presets() {
        let default = KvCacheConfig::default();
        assert!(default.enable_caching && default.track_metrics);
        assert_eq!(default.boundary, CacheBoundary::AfterCanonicalFacts);
        assert_eq!(default.n_keep_tokens, None);

        assert_eq!(KvCacheConfig::aggressive().boundary, CacheBoundary::AfterWorldState);

        let disabled = KvCacheConfig::disabled();
        assert!(!disabled.enable_caching && !disabled.track_metrics);
    }
}
