//! Fallback lines for exhausted retry loops.

use std::collections::HashMap;

use lorekeeper_core::{InferenceResult, InteractionSnapshot};

/// Why the pipeline gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Every attempt failed validation or the model call.
    RetriesExhausted,
    /// The time budget ran out before attempts were used up.
    TimeBudgetExceeded,
    /// The request could not be turned into a snapshot.
    InvalidRequest,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RetriesExhausted => "retries_exhausted",
            Self::TimeBudgetExceeded => "time_budget_exceeded",
            Self::InvalidRequest => "invalid_request",
        };
        write!(f, "{name}")
    }
}

/// Supplies the line spoken when no attempt produced a valid response.
pub trait FallbackProvider: Send + Sync {
    /// Text to return instead of a model response.
    ///
    /// `snapshot` is the first attempt's input when one was built;
    /// `final_result` is the last failed attempt, if any.
    fn fallback_response(
        &self,
        snapshot: Option<&InteractionSnapshot>,
        reason: FailureReason,
        final_result: Option<&InferenceResult>,
    ) -> String;
}

/// Fixed fallback lines, optionally keyed by interaction trigger.
#[derive(Debug, Clone)]
pub struct StaticFallback {
    default_line: String,
    by_trigger: HashMap<String, String>,
}

impl Default for StaticFallback {
    fn default() -> Self {
        Self::new("...")
    }
}

impl StaticFallback {
    /// Fallback that always says `default_line`.
    #[must_use]
    pub fn new(default_line: impl Into<String>) -> Self {
        Self {
            default_line: default_line.into(),
            by_trigger: HashMap::new(),
        }
    }

    /// Use `line` for interactions started by `trigger`.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>, line: impl Into<String>) -> Self {
        self.by_trigger.insert(trigger.into(), line.into());
        self
    }
}

impl FallbackProvider for StaticFallback {
    fn fallback_response(
        &self,
        snapshot: Option<&InteractionSnapshot>,
        _reason: FailureReason,
        _final_result: Option<&InferenceResult>,
    ) -> String {
        snapshot
            .and_then(|s| s.context().trigger.as_deref())
            .and_then(|t| self.by_trigger.get(t))
            .unwrap_or(&self.default_line)
            .clone()
    }
}
