//! Beliefs — "What I think is true"
//!
//! One belief per subject. A belief can be replaced only by a writer of
//! equal or higher authority, and can be flagged as contradicted by game
//! logic without touching its content or confidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::MutationSource;

/// The NPC's current opinion about one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    /// What the belief is about (e.g. `"player"`, `"blacksmith"`).
    pub subject: String,
    /// The belief in natural language.
    pub content: String,
    /// Confidence (0.0 to 1.0).
    pub confidence: f32,
    /// Who wrote the current belief.
    pub source: MutationSource,
    /// Set when game logic detects that the belief conflicts with the world.
    pub contradicted: bool,
    /// Why the belief was flagged, if it was.
    pub contradiction_reason: Option<String>,
    /// When the content was last written.
    pub updated_at: DateTime<Utc>,
}

impl Belief {
    /// Create a new, uncontradicted belief. Confidence is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        content: impl Into<String>,
        confidence: f32,
        source: MutationSource,
    ) -> Self {
        Self {
            subject: subject.into(),
            content: content.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
            contradicted: false,
            contradiction_reason: None,
            updated_at: Utc::now(),
        }
    }

    /// Render as a single prompt line.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "{}: {} (confidence {:.2})",
            self.subject, self.content, self.confidence
        )
    }
}
