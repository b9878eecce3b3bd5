//! World State — "How things stand right now"
//!
//! Mutable key/value facts about the world (door states, quest flags,
//! prices). Only the last writer is remembered; its authority gates the
//! next write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::MutationSource;

/// A single world-state value and its last-writer metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldStateEntry {
    /// State key (e.g. `"castle_gate"`).
    pub key: String,
    /// Current value (e.g. `"closed"`).
    pub value: String,
    /// Who wrote the current value.
    pub source: MutationSource,
    /// When the current value was written.
    pub updated_at: DateTime<Utc>,
    /// Number of successful writes to this key, starting at 1.
    pub revision: u64,
}

impl WorldStateEntry {
    /// Render as a single prompt line, `key: value`.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{}: {}", self.key, self.value)
    }
}
