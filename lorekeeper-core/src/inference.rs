//! Per-attempt inference records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::snapshot::InteractionSnapshot;
use crate::validation::ValidationResult;

/// Everything known about one model attempt.
///
/// The snapshot is attached so that any result can be traced back to the
/// exact input that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    /// 1-indexed attempt number.
    pub attempt_number: u32,
    /// Text that was validated (the dialogue part of the model output).
    pub response: String,
    /// Validation verdict.
    pub validation: ValidationResult,
    /// Input of this attempt.
    pub snapshot: Arc<InteractionSnapshot>,
    /// Prompt tokens reported by the model server.
    pub prompt_tokens: u32,
    /// Generated tokens reported by the model server.
    pub generated_tokens: u32,
    /// Prompt tokens served from the server's cache.
    pub cached_tokens: u32,
    /// Wall time of the model call in milliseconds.
    pub elapsed_ms: u64,
    /// Collaborator failure message, when the call itself failed.
    pub collaborator_error: Option<String>,
}

impl InferenceResult {
    /// Whether the attempt passed validation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid()
    }

    /// A failed attempt for a model call that errored.
    #[must_use]
    pub fn collaborator_failure(
        snapshot: Arc<InteractionSnapshot>,
        error: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        let error = error.into();
        Self {
            attempt_number: snapshot.attempt_number(),
            response: String::new(),
            validation: ValidationResult::invalid_format("", format!("Model call failed: {error}")),
            snapshot,
            prompt_tokens: 0,
            generated_tokens: 0,
            cached_tokens: 0,
            elapsed_ms,
            collaborator_error: Some(error),
        }
    }
}
