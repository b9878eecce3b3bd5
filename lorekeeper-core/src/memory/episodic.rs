//! Episodic Memory — "What happened"
//!
//! Append-only record of things the NPC experienced. Significance fades
//! with every decay tick but entries are never removed by decay; retrieval
//! filters weak memories out instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MemoryId, MutationSource};

/// Category used when none is supplied.
pub const DEFAULT_CATEGORY: &str = "general";

/// A single remembered event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicMemory {
    /// Unique identifier for this memory.
    pub id: MemoryId,
    /// Natural language description of the event.
    pub content: String,
    /// Current significance / strength (0.0 = forgotten, 1.0 = vivid).
    pub significance: f32,
    /// Free-form category, also used as a topic tag (e.g. `"dialogue"`).
    pub category: String,
    /// Who recorded this memory.
    pub source: MutationSource,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Store-local insertion counter; larger is more recent.
    pub sequence: u64,
}

impl EpisodicMemory {
    /// Create a new episodic memory. Significance is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        significance: f32,
        category: impl Into<String>,
        source: MutationSource,
        sequence: u64,
    ) -> Self {
        let category = category.into();
        Self {
            id: MemoryId::new(),
            content: content.into(),
            significance: significance.clamp(0.0, 1.0),
            category: if category.trim().is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                category
            },
            source,
            created_at: Utc::now(),
            sequence,
        }
    }

    /// Current retrieval strength.
    #[must_use]
    pub fn strength(&self) -> f32 {
        self.significance
    }
}
