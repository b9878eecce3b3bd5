//! Interaction snapshots.
//!
//! An [`InteractionSnapshot`] freezes everything one attempt needs: who is
//! speaking, what they know, the rules, and the conversation so far. It is
//! produced by [`SnapshotBuilder`] and has no setters; a retry builds a new
//! snapshot from [`InteractionSnapshot::to_builder`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LoreError, Result, require_non_blank};
use crate::retrieval::RetrievedContext;
use crate::types::SnapshotId;
use crate::validation::{Constraint, ConstraintSet};

/// Who is being addressed, and where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionContext {
    /// NPC identifier; also the persona id of its memory store.
    pub npc_id: String,
    /// Display name used for the response cue.
    pub npc_name: Option<String>,
    /// Free-form scene or location tag.
    pub scene: Option<String>,
    /// What started the interaction (e.g. `"dialogue"`, `"proximity"`).
    pub trigger: Option<String>,
}

/// One line of conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    /// Speaker label as it should appear in the prompt.
    pub speaker: String,
    /// What was said.
    pub text: String,
}

impl DialogueTurn {
    /// Create a turn.
    #[must_use]
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }

    /// `speaker: text`.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{}: {}", self.speaker, self.text)
    }
}

/// Immutable per-attempt input to the prompt pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSnapshot {
    id: SnapshotId,
    context: InteractionContext,
    constraints: ConstraintSet,
    system_prompt: String,
    player_input: String,
    canonical_facts: Vec<String>,
    world_state: Vec<String>,
    episodic_memories: Vec<String>,
    beliefs: Vec<String>,
    dialogue_history: Vec<DialogueTurn>,
    attempt_number: u32,
    created_at: DateTime<Utc>,
}

impl InteractionSnapshot {
    /// Start building a snapshot for `npc_id`.
    #[must_use]
    pub fn builder(npc_id: impl Into<String>) -> SnapshotBuilder {
        SnapshotBuilder::new(npc_id)
    }

    /// A builder pre-filled with this snapshot's content.
    #[must_use]
    pub fn to_builder(&self) -> SnapshotBuilder {
        SnapshotBuilder {
            context: self.context.clone(),
            constraints: self.constraints.clone(),
            system_prompt: self.system_prompt.clone(),
            player_input: self.player_input.clone(),
            canonical_facts: self.canonical_facts.clone(),
            world_state: self.world_state.clone(),
            episodic_memories: self.episodic_memories.clone(),
            beliefs: self.beliefs.clone(),
            dialogue_history: self.dialogue_history.clone(),
            attempt_number: self.attempt_number,
        }
    }

    /// Unique id of this snapshot.
    #[must_use]
    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// Interaction context.
    #[must_use]
    pub fn context(&self) -> &InteractionContext {
        &self.context
    }

    /// Shorthand for `context().npc_id`.
    #[must_use]
    pub fn npc_id(&self) -> &str {
        &self.context.npc_id
    }

    /// Constraints in effect for this attempt.
    #[must_use]
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Persona instructions.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// What the player just said.
    #[must_use]
    pub fn player_input(&self) -> &str {
        &self.player_input
    }

    /// Canonical fact texts.
    #[must_use]
    pub fn canonical_facts(&self) -> &[String] {
        &self.canonical_facts
    }

    /// Rendered world-state lines.
    #[must_use]
    pub fn world_state(&self) -> &[String] {
        &self.world_state
    }

    /// Episodic memory texts, most relevant first.
    #[must_use]
    pub fn episodic_memories(&self) -> &[String] {
        &self.episodic_memories
    }

    /// Rendered beliefs, most relevant first.
    #[must_use]
    pub fn beliefs(&self) -> &[String] {
        &self.beliefs
    }

    /// Conversation so far, oldest first.
    #[must_use]
    pub fn dialogue_history(&self) -> &[DialogueTurn] {
        &self.dialogue_history
    }

    /// 1-indexed attempt this snapshot was built for.
    #[must_use]
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    /// Construction time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Accumulates snapshot fields.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    context: InteractionContext,
    constraints: ConstraintSet,
    system_prompt: String,
    player_input: String,
    canonical_facts: Vec<String>,
    world_state: Vec<String>,
    episodic_memories: Vec<String>,
    beliefs: Vec<String>,
    dialogue_history: Vec<DialogueTurn>,
    attempt_number: u32,
}

impl SnapshotBuilder {
    /// New builder for `npc_id`, attempt 1.
    #[must_use]
    pub fn new(npc_id: impl Into<String>) -> Self {
        Self {
            context: InteractionContext {
                npc_id: npc_id.into(),
                ..InteractionContext::default()
            },
            constraints: ConstraintSet::new(),
            system_prompt: String::new(),
            player_input: String::new(),
            canonical_facts: Vec::new(),
            world_state: Vec::new(),
            episodic_memories: Vec::new(),
            beliefs: Vec::new(),
            dialogue_history: Vec::new(),
            attempt_number: 1,
        }
    }

    /// Display name for the response cue.
    #[must_use]
    pub fn npc_name(mut self, name: impl Into<String>) -> Self {
        self.context.npc_name = Some(name.into());
        self
    }

    /// Scene tag.
    #[must_use]
    pub fn scene(mut self, scene: impl Into<String>) -> Self {
        self.context.scene = Some(scene.into());
        self
    }

    /// Interaction trigger.
    #[must_use]
    pub fn trigger(mut self, trigger: impl Into<String>) -> Self {
        self.context.trigger = Some(trigger.into());
        self
    }

    /// Persona instructions.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Player utterance.
    #[must_use]
    pub fn player_input(mut self, input: impl Into<String>) -> Self {
        self.player_input = input.into();
        self
    }

    /// Replace the constraint set.
    #[must_use]
    pub fn constraints(mut self, constraints: ConstraintSet) -> Self {
        self.constraints = constraints;
        self
    }

    /// Append one constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Append escalated constraints after the existing ones.
    #[must_use]
    pub fn extra_constraints(mut self, constraints: ConstraintSet) -> Self {
        self.constraints.extend(constraints);
        self
    }

    /// Canonical fact texts.
    #[must_use]
    pub fn canonical_facts(mut self, facts: Vec<String>) -> Self {
        self.canonical_facts = facts;
        self
    }

    /// Rendered world-state lines.
    #[must_use]
    pub fn world_state(mut self, lines: Vec<String>) -> Self {
        self.world_state = lines;
        self
    }

    /// Episodic memory texts.
    #[must_use]
    pub fn episodic_memories(mut self, memories: Vec<String>) -> Self {
        self.episodic_memories = memories;
        self
    }

    /// Rendered beliefs.
    #[must_use]
    pub fn beliefs(mut self, beliefs: Vec<String>) -> Self {
        self.beliefs = beliefs;
        self
    }

    /// Take all four sections from a retrieval result.
    #[must_use]
    pub fn retrieved(self, context: RetrievedContext) -> Self {
        self.canonical_facts(context.canonical_facts)
            .world_state(context.world_state)
            .episodic_memories(context.episodic_memories)
            .beliefs(context.beliefs)
    }

    /// Replace the dialogue history.
    #[must_use]
    pub fn dialogue_history(mut self, turns: Vec<DialogueTurn>) -> Self {
        self.dialogue_history = turns;
        self
    }

    /// Append one dialogue turn.
    #[must_use]
    pub fn dialogue_turn(mut self, speaker: impl Into<String>, text: impl Into<String>) -> Self {
        self.dialogue_history.push(DialogueTurn::new(speaker, text));
        self
    }

    /// 1-indexed attempt number.
    #[must_use]
    pub fn attempt_number(mut self, attempt: u32) -> Self {
        self.attempt_number = attempt;
        self
    }

    /// Freeze into a snapshot.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`] if the NPC id is blank or the
    /// attempt number is zero.
    pub fn build(self) -> Result<InteractionSnapshot> {
        require_non_blank("npc_id", &self.context.npc_id)?;
        if self.attempt_number == 0 {
            return Err(LoreError::invalid("attempt_number", "attempts are 1-indexed"));
        }
        Ok(InteractionSnapshot {
            id: SnapshotId::new(),
            context: self.context,
            constraints: self.constraints,
            system_prompt: self.system_prompt,
            player_input: self.player_input,
            canonical_facts: self.canonical_facts,
            world_state: self.world_state,
            episodic_memories: self.episodic_memories,
            beliefs: self.beliefs,
            dialogue_history: self.dialogue_history,
            attempt_number: self.attempt_number,
            created_at: Utc::now(),
        })
    }
}
