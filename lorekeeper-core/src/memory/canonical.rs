//! Canonical Facts — "What is always true"
//!
//! Designer-authored truths about the world. Write-once: an id can be
//! claimed exactly once and the fact never expires or decays.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable world truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFact {
    /// Stable identifier chosen by the author (e.g. `"king-name"`).
    pub id: String,
    /// The fact in natural language.
    pub text: String,
    /// Grouping used as a topic tag during retrieval (e.g. `"lore"`).
    pub domain: String,
    /// When the fact entered the store.
    pub created_at: DateTime<Utc>,
}

impl CanonicalFact {
    /// Create a new canonical fact stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            domain: domain.into(),
            created_at: Utc::now(),
        }
    }
}
