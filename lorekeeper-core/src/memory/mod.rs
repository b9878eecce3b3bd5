//! Authority-ranked memory store.
//!
//! One [`MemoryStore`] holds everything a single persona knows, split into
//! four kinds with different mutation rules:
//!
//! - **Canonical facts** — write-once, never expire
//! - **World state** — last-writer-wins, gated by [`MutationSource`] rank
//! - **Episodic memories** — append-only, fade with decay ticks
//! - **Beliefs** — one per subject, gated by rank, flaggable as contradicted
//!
//! The store is `Send + Sync`. Every mutating call takes the write lock once,
//! so the authority check and the write it guards are a single atomic step.

pub mod belief;
pub mod canonical;
pub mod episodic;
pub mod world_state;

pub use belief::Belief;
pub use canonical::CanonicalFact;
pub use episodic::EpisodicMemory;
pub use world_state::WorldStateEntry;

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MemoryConfig;
use crate::decay;
use crate::error::{Result, require_finite, require_non_blank};
use crate::types::MutationSource;

// ---------------------------------------------------------------------------
// Mutation results
// ---------------------------------------------------------------------------

/// Why a well-formed mutation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationFailure {
    /// A write-once entry with this id already exists.
    AlreadyExists,
    /// The writer ranks below whoever last wrote the entry.
    InsufficientAuthority {
        /// The last writer.
        existing: MutationSource,
        /// The rejected writer.
        attempted: MutationSource,
    },
    /// The entry to modify does not exist.
    NotFound,
}

impl fmt::Display for MutationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => write!(f, "already exists"),
            Self::InsufficientAuthority { existing, attempted } => write!(
                f,
                "insufficient authority: {attempted} cannot overwrite {existing}"
            ),
            Self::NotFound => write!(f, "not found"),
        }
    }
}

/// Outcome of a mutating store call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    /// Whether the store changed.
    pub success: bool,
    /// Why it did not, when `success` is false.
    pub failure: Option<MutationFailure>,
    /// The id, key, or subject the call targeted.
    pub target: String,
}

impl MutationResult {
    fn applied(target: impl Into<String>) -> Self {
        Self {
            success: true,
            failure: None,
            target: target.into(),
        }
    }

    fn rejected(target: impl Into<String>, failure: MutationFailure) -> Self {
        Self {
            success: false,
            failure: Some(failure),
            target: target.into(),
        }
    }
}

/// Entry counts per memory kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Canonical facts.
    pub canonical_facts: usize,
    /// World-state keys.
    pub world_state: usize,
    /// Episodic memories.
    pub episodic: usize,
    /// Belief subjects.
    pub beliefs: usize,
    /// Decay ticks applied so far.
    pub decay_ticks: u64,
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreInner {
    canonical: Vec<CanonicalFact>,
    canonical_index: HashMap<String, usize>,
    world_state: Vec<WorldStateEntry>,
    world_index: HashMap<String, usize>,
    episodic: Vec<EpisodicMemory>,
    beliefs: Vec<Belief>,
    belief_index: HashMap<String, usize>,
    next_sequence: u64,
    decay_ticks: u64,
}

/// Per-persona memory store.
#[derive(Debug)]
pub struct MemoryStore {
    persona_id: String,
    config: MemoryConfig,
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    /// Create an empty store with default configuration.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`](crate::error::LoreError::InvalidArgument) if `persona_id` is blank.
    pub fn new(persona_id: impl Into<String>) -> Result<Self> {
        Self::with_config(persona_id, MemoryConfig::default())
    }

    /// Create an empty store with explicit configuration.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`](crate::error::LoreError::InvalidArgument) if `persona_id` is blank or the
    /// decay rate is outside `[0, 1]`.
    pub fn with_config(persona_id: impl Into<String>, config: MemoryConfig) -> Result<Self> {
        let persona_id = persona_id.into();
        require_non_blank("persona_id", &persona_id)?;
        config.validate()?;
        Ok(Self {
            persona_id,
            config,
            inner: RwLock::new(StoreInner::default()),
        })
    }

    /// The persona this store belongs to.
    #[must_use]
    pub fn persona_id(&self) -> &str {
        &self.persona_id
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    // -- Canonical facts ---------------------------------------------------

    /// Add a write-once canonical fact.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`](crate::error::LoreError::InvalidArgument) if `id` or `text` is blank.
    pub fn add_canonical_fact(
        &self,
        id: impl Into<String>,
        text: impl Into<String>,
        domain: impl Into<String>,
    ) -> Result<MutationResult> {
        let fact = CanonicalFact::new(id, text, domain);
        require_non_blank("id", &fact.id)?;
        require_non_blank("text", &fact.text)?;

        let mut inner = self.inner.write();
        if inner.canonical_index.contains_key(&fact.id) {
            debug!(persona = %self.persona_id, id = %fact.id, "canonical fact already exists");
            return Ok(MutationResult::rejected(fact.id, MutationFailure::AlreadyExists));
        }
        let id = fact.id.clone();
        let position = inner.canonical.len();
        inner.canonical_index.insert(id.clone(), position);
        inner.canonical.push(fact);
        Ok(MutationResult::applied(id))
    }

    /// Look up one canonical fact.
    #[must_use]
    pub fn canonical_fact(&self, id: &str) -> Option<CanonicalFact> {
        let inner = self.inner.read();
        inner
            .canonical_index
            .get(id)
            .and_then(|&i| inner.canonical.get(i))
            .cloned()
    }

    /// All canonical facts in insertion order.
    #[must_use]
    pub fn canonical_facts(&self) -> Vec<CanonicalFact> {
        self.inner.read().canonical.clone()
    }

    // -- World state -------------------------------------------------------

    /// Write a world-state value if `source` ranks at least as high as the
    /// key's last writer.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`](crate::error::LoreError::InvalidArgument) if `key` is blank.
    pub fn set_world_state(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        source: MutationSource,
    ) -> Result<MutationResult> {
        let key = key.into();
        require_non_blank("key", &key)?;
        let value = value.into();

        let mut inner = self.inner.write();
        if let Some(&i) = inner.world_index.get(&key) {
            let entry = &mut inner.world_state[i];
            if !source.can_overwrite(entry.source) {
                debug!(
                    persona = %self.persona_id,
                    key = %key,
                    existing = %entry.source,
                    attempted = %source,
                    "world-state write rejected"
                );
                return Ok(MutationResult::rejected(
                    key,
                    MutationFailure::InsufficientAuthority {
                        existing: entry.source,
                        attempted: source,
                    },
                ));
            }
            entry.value = value;
            entry.source = source;
            entry.updated_at = Utc::now();
            entry.revision += 1;
            return Ok(MutationResult::applied(key));
        }

        let position = inner.world_state.len();
        inner.world_index.insert(key.clone(), position);
        inner.world_state.push(WorldStateEntry {
            key: key.clone(),
            value,
            source,
            updated_at: Utc::now(),
            revision: 1,
        });
        Ok(MutationResult::applied(key))
    }

    /// Current value and metadata for `key`.
    #[must_use]
    pub fn world_state(&self, key: &str) -> Option<WorldStateEntry> {
        let inner = self.inner.read();
        inner
            .world_index
            .get(key)
            .and_then(|&i| inner.world_state.get(i))
            .cloned()
    }

    /// All world-state entries in first-write order.
    #[must_use]
    pub fn all_world_state(&self) -> Vec<WorldStateEntry> {
        self.inner.read().world_state.clone()
    }

    // -- Episodic memories -------------------------------------------------

    /// Append an episodic memory. Significance is clamped to `[0, 1]`.
    ///
    /// When the configured capacity is exceeded the weakest, oldest entry is
    /// pruned. The result's `target` is the new memory's id.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`](crate::error::LoreError::InvalidArgument) if `content` is blank or
    /// `significance` is not finite.
    pub fn add_episodic_memory(
        &self,
        content: impl Into<String>,
        significance: f32,
        category: impl Into<String>,
        source: MutationSource,
    ) -> Result<MutationResult> {
        let content = content.into();
        require_non_blank("content", &content)?;
        require_finite("significance", significance)?;

        let mut inner = self.inner.write();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        let memory = EpisodicMemory::new(content, significance, category, source, sequence);
        let id = memory.id.to_string();
        inner.episodic.push(memory);

        if inner.episodic.len() > self.config.max_episodic_memories {
            prune_weakest(&mut inner.episodic);
        }
        Ok(MutationResult::applied(id))
    }

    /// Up to `limit` episodic memories, most recent first.
    #[must_use]
    pub fn recent_memories(&self, limit: usize) -> Vec<EpisodicMemory> {
        let inner = self.inner.read();
        inner.episodic.iter().rev().take(limit).cloned().collect()
    }

    /// All episodic memories in insertion order.
    #[must_use]
    pub fn all_episodic_memories(&self) -> Vec<EpisodicMemory> {
        self.inner.read().episodic.clone()
    }

    /// Fade every episodic memory by the configured decay rate.
    ///
    /// Returns how many memories actually lost significance.
    pub fn apply_decay_tick(&self) -> usize {
        let mut inner = self.inner.write();
        inner.decay_ticks += 1;
        let changed = decay::apply_tick(&mut inner.episodic, self.config.decay_rate);
        debug!(
            persona = %self.persona_id,
            tick = inner.decay_ticks,
            changed,
            "applied decay tick"
        );
        changed
    }

    // -- Beliefs -----------------------------------------------------------

    /// Write the belief for `subject` if `source` ranks at least as high as
    /// the current belief's writer. A successful overwrite clears any
    /// contradiction flag.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`](crate::error::LoreError::InvalidArgument) if `subject` or `content` is
    /// blank, or `confidence` is not finite.
    pub fn set_belief(
        &self,
        subject: impl Into<String>,
        content: impl Into<String>,
        confidence: f32,
        source: MutationSource,
    ) -> Result<MutationResult> {
        let belief = Belief::new(subject, content, confidence, source);
        require_non_blank("subject", &belief.subject)?;
        require_non_blank("content", &belief.content)?;
        require_finite("confidence", confidence)?;

        let mut inner = self.inner.write();
        let subject = belief.subject.clone();
        if let Some(&i) = inner.belief_index.get(&subject) {
            let existing = inner.beliefs[i].source;
            if !source.can_overwrite(existing) {
                return Ok(MutationResult::rejected(
                    subject,
                    MutationFailure::InsufficientAuthority {
                        existing,
                        attempted: source,
                    },
                ));
            }
            inner.beliefs[i] = belief;
            return Ok(MutationResult::applied(subject));
        }

        let position = inner.beliefs.len();
        inner.belief_index.insert(subject.clone(), position);
        inner.beliefs.push(belief);
        Ok(MutationResult::applied(subject))
    }

    /// The belief held about `subject`.
    #[must_use]
    pub fn belief(&self, subject: &str) -> Option<Belief> {
        let inner = self.inner.read();
        inner
            .belief_index
            .get(subject)
            .and_then(|&i| inner.beliefs.get(i))
            .cloned()
    }

    /// All beliefs in first-write order, contradicted ones included.
    #[must_use]
    pub fn all_beliefs(&self) -> Vec<Belief> {
        self.inner.read().beliefs.clone()
    }

    /// Flag the belief about `subject` as contradicted. Authority is not
    /// checked and content/confidence are left untouched.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`](crate::error::LoreError::InvalidArgument) if `subject` is blank.
    pub fn mark_belief_contradicted(
        &self,
        subject: &str,
        reason: impl Into<String>,
    ) -> Result<MutationResult> {
        require_non_blank("subject", subject)?;
        let reason = reason.into();
        self.with_belief_mut(subject, |belief| {
            belief.contradicted = true;
            belief.contradiction_reason = Some(reason);
        })
    }

    /// Remove the contradiction flag from the belief about `subject`.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`](crate::error::LoreError::InvalidArgument) if `subject` is blank.
    pub fn clear_belief_contradiction(&self, subject: &str) -> Result<MutationResult> {
        require_non_blank("subject", subject)?;
        self.with_belief_mut(subject, |belief| {
            belief.contradicted = false;
            belief.contradiction_reason = None;
        })
    }

    fn with_belief_mut(&self, subject: &str, f: impl FnOnce(&mut Belief)) -> Result<MutationResult> {
        let mut inner = self.inner.write();
        let Some(&i) = inner.belief_index.get(subject) else {
            return Ok(MutationResult::rejected(subject, MutationFailure::NotFound));
        };
        f(&mut inner.beliefs[i]);
        Ok(MutationResult::applied(subject))
    }

    // -- Persistence bridge -----------------------------------------------

    /// Episodic memory contents in insertion order, for a persistence
    /// collaborator.
    #[must_use]
    pub fn export_memory_strings(&self) -> Vec<String> {
        self.inner
            .read()
            .episodic
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    /// Re-create episodic memories from persisted strings. Blank lines are
    /// skipped. Returns how many memories were added.
    ///
    /// # Errors
    /// Propagates errors from [`MemoryStore::add_episodic_memory`].
    pub fn import_memory_strings<I, S>(&self, memories: I, source: MutationSource) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for memory in memories {
            let memory = memory.into();
            if memory.trim().is_empty() {
                continue;
            }
            self.add_episodic_memory(memory, 1.0, "persisted", source)?;
            added += 1;
        }
        Ok(added)
    }

    /// Entry counts per memory kind.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            canonical_facts: inner.canonical.len(),
            world_state: inner.world_state.len(),
            episodic: inner.episodic.len(),
            beliefs: inner.beliefs.len(),
            decay_ticks: inner.decay_ticks,
        }
    }
}

/// Remove the least significant memory, oldest first among equals.
fn prune_weakest(memories: &mut Vec<EpisodicMemory>) {
    let weakest = memories
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.significance
                .total_cmp(&b.significance)
                .then(a.sequence.cmp(&b.sequence))
        })
        .map(|(i, _)| i);
    if let Some(i) = weakest {
        memories.remove(i);
    }
}
