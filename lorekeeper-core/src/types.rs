//! Core type definitions shared across the lorekeeper pipeline.
//!
//! All value types are serializable so that snapshots and results can be
//! exported for auditing.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for an episodic memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an interaction snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub Uuid);

impl SnapshotId {
    /// Create a new random snapshot ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Mutation Authority
// ---------------------------------------------------------------------------

/// Who is writing to the memory store.
///
/// Sources form a total order by [`MutationSource::authority_rank`]:
/// `Designer > GameSystem > ValidatedOutput`. A write may replace an
/// existing entry only when its rank is at least the rank of the last writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationSource {
    /// Text the model produced that passed validation.
    ValidatedOutput,
    /// Game logic (quests, combat, economy).
    GameSystem,
    /// Hand-authored content.
    Designer,
}

impl MutationSource {
    /// Numeric authority rank; higher wins.
    #[must_use]
    pub const fn authority_rank(self) -> u8 {
        match self {
            Self::ValidatedOutput => 0,
            Self::GameSystem => 1,
            Self::Designer => 2,
        }
    }

    /// Whether this source may overwrite an entry last written by `existing`
    /// (equal rank is enough).
    #[must_use]
    pub const fn can_overwrite(self, existing: Self) -> bool {
        self.authority_rank() >= existing.authority_rank()
    }
}

impl PartialOrd for MutationSource {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MutationSource {
    fn cmp(&self, other: &Self) -> Ordering {
        self.authority_rank().cmp(&other.authority_rank())
    }
}

impl fmt::Display for MutationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ValidatedOutput => "validated_output",
            Self::GameSystem => "game_system",
            Self::Designer => "designer",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Diagnostics side channel
// ---------------------------------------------------------------------------

/// Optional diagnostics callback injected into the retriever and assembler.
///
/// Purely a side channel: nothing it does can change component results.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Forward a line to an optional sink.
pub(crate) fn emit(sink: Option<&LogSink>, line: impl FnOnce() -> String) {
    if let Some(sink) = sink {
        sink(&line());
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Number of Unicode scalar values in `text`.
///
/// All character budgets and counts in the pipeline use this measure.
#[must_use]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Truncate `text` to at most `max_chars` characters, appending `marker`
/// when anything was cut.
#[must_use]
pub fn preview(text: &str, max_chars: usize, marker: &str) -> String {
    if char_len(text) <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str(marker);
    out
}
