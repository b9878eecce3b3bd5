//! Working memory: a bounded projection of a snapshot.
//!
//! Count caps are applied first, then the character budget. When over
//! budget, sections are trimmed in this order until the view fits or
//! nothing droppable remains:
//!
//! 1. episodic memories, least relevant (last) first
//! 2. beliefs, least relevant (last) first
//! 3. dialogue turns, oldest first
//! 4. world state, then canonical facts, last first, and only when not
//!    configured as always-included
//!
//! The system prompt, player input, and constraints are never trimmed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::snapshot::{DialogueTurn, InteractionSnapshot};
use crate::types::char_len;
use crate::validation::ConstraintSet;

/// Working-memory limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingMemoryConfig {
    /// Most recent dialogue turns kept.
    pub max_dialogue_turns: usize,
    /// Episodic memories kept.
    pub max_episodic_memories: usize,
    /// Beliefs kept.
    pub max_beliefs: usize,
    /// Character budget for all included text.
    pub max_context_chars: usize,
    /// Never drop canonical facts for budget reasons.
    pub always_include_canonical_facts: bool,
    /// Never drop world state for budget reasons.
    pub always_include_world_state: bool,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self {
            max_dialogue_turns: 10,
            max_episodic_memories: 5,
            max_beliefs: 5,
            max_context_chars: 4000,
            always_include_canonical_facts: true,
            always_include_world_state: true,
        }
    }
}

/// Bounded, owned view used for prompt assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingMemory {
    npc_id: String,
    npc_name: Option<String>,
    system_prompt: String,
    player_input: String,
    constraints: ConstraintSet,
    canonical_facts: Vec<String>,
    world_state: Vec<String>,
    episodic_memories: Vec<String>,
    beliefs: Vec<String>,
    dialogue_history: Vec<DialogueTurn>,
    attempt_number: u32,
    was_truncated: bool,
}

impl WorkingMemory {
    /// Project `snapshot` under `config`.
    #[must_use]
    pub fn from_snapshot(snapshot: &InteractionSnapshot, config: &WorkingMemoryConfig) -> Self {
        let mut truncated = false;

        let mut episodic_memories = snapshot.episodic_memories().to_vec();
        truncated |= cap_from_end(&mut episodic_memories, config.max_episodic_memories);
        let mut beliefs = snapshot.beliefs().to_vec();
        truncated |= cap_from_end(&mut beliefs, config.max_beliefs);
        let mut dialogue_history = snapshot.dialogue_history().to_vec();
        if dialogue_history.len() > config.max_dialogue_turns {
            let excess = dialogue_history.len() - config.max_dialogue_turns;
            dialogue_history.drain(..excess);
            truncated = true;
        }

        let mut memory = Self {
            npc_id: snapshot.npc_id().to_string(),
            npc_name: snapshot.context().npc_name.clone(),
            system_prompt: snapshot.system_prompt().to_string(),
            player_input: snapshot.player_input().to_string(),
            constraints: snapshot.constraints().clone(),
            canonical_facts: snapshot.canonical_facts().to_vec(),
            world_state: snapshot.world_state().to_vec(),
            episodic_memories,
            beliefs,
            dialogue_history,
            attempt_number: snapshot.attempt_number(),
            was_truncated: truncated,
        };
        memory.fit_budget(config);
        memory
    }

    fn fit_budget(&mut self, config: &WorkingMemoryConfig) {
        let budget = config.max_context_chars;
        let mut used = self.character_count();
        let before = used;

        while used > budget {
            let freed = if let Some(m) = self.episodic_memories.pop() {
                char_len(&m)
            } else if let Some(b) = self.beliefs.pop() {
                char_len(&b)
            } else if !self.dialogue_history.is_empty() {
                turn_len(&self.dialogue_history.remove(0))
            } else if !config.always_include_world_state && !self.world_state.is_empty() {
                self.world_state.pop().map_or(0, |s| char_len(&s))
            } else if !config.always_include_canonical_facts && !self.canonical_facts.is_empty() {
                self.canonical_facts.pop().map_or(0, |s| char_len(&s))
            } else {
                break;
            };
            used -= freed;
            self.was_truncated = true;
        }

        if used != before {
            debug!(
                npc_id = %self.npc_id,
                before,
                after = used,
                budget,
                "working memory trimmed to budget"
            );
        }
    }

    /// Characters of all included text, as counted against the budget.
    #[must_use]
    pub fn character_count(&self) -> usize {
        char_len(&self.system_prompt)
            + char_len(&self.player_input)
            + self.constraints.iter().map(|c| char_len(c.prompt_line())).sum::<usize>()
            + self.canonical_facts.iter().map(|s| char_len(s)).sum::<usize>()
            + self.world_state.iter().map(|s| char_len(s)).sum::<usize>()
            + self.episodic_memories.iter().map(|s| char_len(s)).sum::<usize>()
            + self.beliefs.iter().map(|s| char_len(s)).sum::<usize>()
            + self.dialogue_history.iter().map(turn_len).sum::<usize>()
    }

    /// Clear every owned collection.
    pub fn release(&mut self) {
        self.system_prompt.clear();
        self.player_input.clear();
        self.constraints = ConstraintSet::new();
        self.canonical_facts.clear();
        self.world_state.clear();
        self.episodic_memories.clear();
        self.beliefs.clear();
        self.dialogue_history.clear();
    }

    /// NPC the view belongs to.
    #[must_use]
    pub fn npc_id(&self) -> &str {
        &self.npc_id
    }

    /// Display name, if the snapshot carried one.
    #[must_use]
    pub fn npc_name(&self) -> Option<&str> {
        self.npc_name.as_deref()
    }

    /// Persona instructions.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Player utterance.
    #[must_use]
    pub fn player_input(&self) -> &str {
        &self.player_input
    }

    /// Constraints for this attempt.
    #[must_use]
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Included canonical facts.
    #[must_use]
    pub fn canonical_facts(&self) -> &[String] {
        &self.canonical_facts
    }

    /// Included world-state lines.
    #[must_use]
    pub fn world_state(&self) -> &[String] {
        &self.world_state
    }

    /// Included episodic memories.
    #[must_use]
    pub fn episodic_memories(&self) -> &[String] {
        &self.episodic_memories
    }

    /// Included beliefs.
    #[must_use]
    pub fn beliefs(&self) -> &[String] {
        &self.beliefs
    }

    /// Included dialogue, oldest first.
    #[must_use]
    pub fn dialogue_history(&self) -> &[DialogueTurn] {
        &self.dialogue_history
    }

    /// Attempt number of the source snapshot.
    #[must_use]
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    /// Whether anything was dropped by caps or budget.
    #[must_use]
    pub fn was_truncated(&self) -> bool {
        self.was_truncated
    }
}

fn cap_from_end<T>(items: &mut Vec<T>, cap: usize) -> bool {
    if items.len() > cap {
        items.truncate(cap);
        true
    } else {
        false
    }
}

fn turn_len(turn: &DialogueTurn) -> usize {
    char_len(&turn.speaker) + char_len(&turn.text)
}
