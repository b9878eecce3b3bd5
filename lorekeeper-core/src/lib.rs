//! # Lorekeeper Core Library
//!
//! Deterministic decision pipeline that turns a player utterance into a
//! validated, memory-consistent NPC response from a language model.
//!
//! - [`memory`]: authority-ranked store of canonical facts, world state,
//!   episodic memories, and beliefs
//! - [`retrieval`]: keyword-relevance context retrieval with hard caps
//! - [`snapshot`] / [`working_memory`]: immutable per-attempt input and
//!   its character-budgeted view
//! - [`prompt`]: prompt assembly, KV-cache prefix split, and prefix
//!   stability auditing
//! - [`validation`]: constraint checking and retry escalation
//!
//! The model call itself is an external collaborator (see the
//! `lorekeeper-llm` crate); everything here is synchronous and pure apart
//! from the memory store's interior locking.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod decay;
pub mod error;
pub mod inference;
pub mod memory;
pub mod persistence;
pub mod prompt;
pub mod retrieval;
pub mod snapshot;
pub mod types;
pub mod validation;
pub mod working_memory;

pub use config::{LorekeeperConfig, MemoryConfig, RetrievalConfig};
pub use error::{LoreError, Result};
pub use inference::InferenceResult;
pub use memory::{MemoryStore, MutationFailure, MutationResult};
pub use prompt::{
    AssembledPrompt, CacheBoundary, CachedPrompt, KvCacheConfig, PrefixStabilityValidator,
    PrefixViolation, PromptAssembler, PromptAssemblerConfig,
};
pub use retrieval::{ContextRetriever, RetrievedContext};
pub use snapshot::{DialogueTurn, InteractionSnapshot, SnapshotBuilder};
pub use types::*;
pub use validation::{
    Constraint, ConstraintKind, ConstraintSet, EscalationMode, RetryPolicy, ValidationOutcome,
    ValidationResult, Violation,
};
pub use working_memory::{WorkingMemory, WorkingMemoryConfig};
