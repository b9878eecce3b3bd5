//! Integration Tests — end-to-end flows through the core pipeline.
//!
//! store → retrieve → snapshot → working memory → prompt → validate →
//! escalate → re-prompt, without a model in the loop.

use std::sync::Arc;

use lorekeeper_core::config::PersistenceConfig;
use lorekeeper_core::persistence::{MemoryPersistence, SqliteMemoryPersistence};
use lorekeeper_core::prompt::PromptSection;
use lorekeeper_core::validation::validate;
use lorekeeper_core::{
    CacheBoundary, Constraint, ConstraintSet, ContextRetriever, InferenceResult,
    InteractionSnapshot, KvCacheConfig, MemoryStore, MutationSource, PrefixStabilityValidator,
    PromptAssembler, PromptAssemblerConfig, RetryPolicy, ValidationOutcome, WorkingMemory,
    WorkingMemoryConfig,
};

fn assembler() -> PromptAssembler {
    PromptAssembler::new(PromptAssemblerConfig::default()).expect("valid config")
}

fn kingdom_store() -> MemoryStore {
    let store = MemoryStore::new("npc-herald").expect("valid persona");
    store
        .add_canonical_fact("fact-1", "The king is Arthur", "lore")
        .expect("valid");
    store
        .add_canonical_fact("fact-2", "Camelot lies beyond the river", "geography")
        .expect("valid");
    store
        .set_world_state("king_location", "Camelot", MutationSource::GameSystem)
        .expect("valid");
    store
        .add_episodic_memory("The player asked about the king yesterday", 0.6, "dialogue", MutationSource::ValidatedOutput)
        .expect("valid");
    store
}

// ---------------------------------------------------------------------------
// Retrieval scenarios
// ---------------------------------------------------------------------------

#[test]
fn retrieving_king_finds_arthur() {
    let store = MemoryStore::new("npc").expect("valid");
    store
        .add_canonical_fact("fact-1", "The king is Arthur", "lore")
        .expect("valid");
    let context = ContextRetriever::default().retrieve(&store, "king", &[]);
    assert!(context.has_content);
    assert!(context.canonical_facts.iter().any(|f| f.contains("Arthur")));
}

#[test]
fn lower_authority_write_leaves_value_unchanged() {
    let store = kingdom_store();
    let result = store
        .set_world_state("king_location", "Avalon", MutationSource::ValidatedOutput)
        .expect("valid");
    assert!(!result.success);
    assert_eq!(
        store.world_state("king_location").map(|e| e.value),
        Some("Camelot".to_string())
    );
}

// ---------------------------------------------------------------------------
// Prompt scenarios
// ---------------------------------------------------------------------------

#[test]
fn minimal_system_prompt_is_cached() {
    let snapshot = InteractionSnapshot::builder("npc")
        .system_prompt("Hi.")
        .build()
        .expect("valid");
    let wm = WorkingMemory::from_snapshot(&snapshot, &WorkingMemoryConfig::default());
    let split = assembler().assemble_with_cache_info(&wm, &KvCacheConfig::default(), None, None);
    assert!(!split.static_prefix.is_empty());
    assert!(split.static_prefix.contains("System:"));
    assert!(split.estimated_static_tokens >= 1);
}

#[test]
fn retrieved_context_flows_into_prompt() {
    let store = kingdom_store();
    let context = ContextRetriever::default().retrieve(&store, "Where is the king?", &[]);
    let snapshot = InteractionSnapshot::builder("npc-herald")
        .npc_name("Herald")
        .system_prompt("You are the royal herald.")
        .player_input("Where is the king?")
        .retrieved(context)
        .build()
        .expect("valid");
    let wm = WorkingMemory::from_snapshot(&snapshot, &WorkingMemoryConfig::default());
    let split = assembler().assemble_with_cache_info(&wm, &KvCacheConfig::aggressive(), None, None);

    assert!(split.static_prefix.contains("The king is Arthur"));
    assert!(split.static_prefix.contains("king_location: Camelot"));
    assert!(split.dynamic_suffix.contains("asked about the king"));
    assert!(split.dynamic_suffix.contains("Player: Where is the king?"));
    assert!(split.full_prompt.ends_with("Herald:"));
    assert_eq!(split.breakdown.total(), split.total_char_count);
    assert!(split.breakdown.get(PromptSection::CanonicalFacts) > 0);
}

#[test]
fn consecutive_turns_keep_prefix_stable() {
    let store = kingdom_store();
    let retriever = ContextRetriever::default();
    let auditor = PrefixStabilityValidator::new();
    let mut history = Vec::new();

    for (turn, input) in ["Hello herald", "Tell me about the king", "Farewell"].iter().enumerate() {
        let mut context =
            retriever.retrieve_for_prompt(&store, input, &[], &WorkingMemoryConfig::default());
        context.episodic_memories.clear();
        let snapshot = InteractionSnapshot::builder("npc-herald")
            .system_prompt("You are the royal herald.")
            .canonical_facts(context.canonical_facts)
            .player_input(*input)
            .dialogue_history(history.clone())
            .build()
            .expect("valid");
        let wm = WorkingMemory::from_snapshot(&snapshot, &WorkingMemoryConfig::default());
        let split = assembler().assemble_with_cache_info(&wm, &KvCacheConfig::default(), None, None);
        let violation = auditor.validate_prompt("npc-herald", &split).expect("no throw");
        assert!(violation.is_none(), "turn {turn} changed the prefix");
        history.push(lorekeeper_core::DialogueTurn::new("Player", *input));
    }
    assert!(!auditor.has_violations());
}

// ---------------------------------------------------------------------------
// Validation + retry escalation
// ---------------------------------------------------------------------------

#[test]
fn secret_prohibition_escalates_and_second_answer_passes() {
    let constraints = ConstraintSet::from(vec![Constraint::prohibition(
        "no-secret",
        "Never mention the secret",
        ["secret"],
    )]);
    let policy = RetryPolicy::default();

    let first_snapshot = Arc::new(
        InteractionSnapshot::builder("npc")
            .system_prompt("You are a spy.")
            .player_input("What do you know?")
            .constraints(constraints)
            .build()
            .expect("valid"),
    );
    let validation = validate("I know a secret", first_snapshot.constraints());
    assert_eq!(validation.outcome, ValidationOutcome::ProhibitionViolated);

    let escalated = policy.generate_retry_constraints(&validation.violations, 1);
    assert!(escalated
        .iter()
        .any(|c| c.patterns.iter().any(|p| p.to_string() == "secret")));

    let first = InferenceResult {
        attempt_number: 1,
        response: "I know a secret".to_string(),
        validation,
        snapshot: Arc::clone(&first_snapshot),
        prompt_tokens: 0,
        generated_tokens: 0,
        cached_tokens: 0,
        elapsed_ms: 0,
        collaborator_error: None,
    };
    let feedback = policy.generate_retry_feedback(&first);
    assert!(feedback.contains("[Retry 2 of 3]"));
    assert!(feedback.contains("I know a secret"));
    assert!(feedback.contains("Never mention the secret"));

    let second_snapshot = first_snapshot
        .to_builder()
        .attempt_number(2)
        .extra_constraints(escalated)
        .build()
        .expect("valid");
    let wm = WorkingMemory::from_snapshot(&second_snapshot, &WorkingMemoryConfig::default());
    let prompt = assembler().assemble(&wm, Some(&feedback), None);
    assert!(prompt.text.contains("Do NOT say \"secret\""));

    assert!(validate("Nothing to add", second_snapshot.constraints()).is_valid());
}

#[test]
fn feedback_truncates_long_previous_response() {
    let snapshot = Arc::new(InteractionSnapshot::builder("npc").build().expect("valid"));
    let long = "word ".repeat(100);
    let result = InferenceResult {
        attempt_number: 1,
        response: long.clone(),
        validation: validate(&long, &ConstraintSet::from(vec![Constraint::prohibition("w", "no words", ["word"])])),
        snapshot,
        prompt_tokens: 0,
        generated_tokens: 0,
        cached_tokens: 0,
        elapsed_ms: 0,
        collaborator_error: None,
    };
    let feedback = RetryPolicy::default().generate_retry_feedback(&result);
    assert!(feedback.contains("..."));
    assert!(!feedback.contains(long.trim_end()));
}

#[test]
fn collaborator_failure_is_invalid_format() {
    let snapshot = Arc::new(InteractionSnapshot::builder("npc").build().expect("valid"));
    let failed = InferenceResult::collaborator_failure(snapshot, "connection refused", 12);
    assert_eq!(failed.validation.outcome, ValidationOutcome::InvalidFormat);
    let feedback = RetryPolicy::default().generate_retry_feedback(&failed);
    assert!(feedback.contains("connection refused"));
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn memories_survive_a_save_load_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("world.db");
    let store = kingdom_store();

    SqliteMemoryPersistence::open(&db, &PersistenceConfig::default())
        .expect("open")
        .save_store(&store)
        .expect("save");

    let restored = MemoryStore::new("npc-herald").expect("valid");
    let added = SqliteMemoryPersistence::open(&db, &PersistenceConfig::default())
        .expect("reopen")
        .restore_store(&restored, MutationSource::GameSystem)
        .expect("restore");
    assert_eq!(added, 1);
    let context = ContextRetriever::default().retrieve(&restored, "king", &[]);
    assert_eq!(context.episodic_memories.len(), 1);
}

#[test]
fn every_boundary_keeps_dialogue_dynamic() {
    let snapshot = InteractionSnapshot::builder("npc")
        .system_prompt("You are a bard.")
        .canonical_facts(vec!["Songs are free on holidays".into()])
        .world_state(vec!["holiday: true".into()])
        .constraint(Constraint::requirement("rhyme", "Answer in rhyme", Vec::<String>::new()))
        .dialogue_turn("Player", "UNIQUE-DIALOGUE-MARKER")
        .player_input("UNIQUE-INPUT-MARKER")
        .build()
        .expect("valid");
    let wm = WorkingMemory::from_snapshot(&snapshot, &WorkingMemoryConfig::default());
    for boundary in CacheBoundary::ALL {
        let cache = KvCacheConfig {
            boundary,
            ..KvCacheConfig::default()
        };
        let split = assembler().assemble_with_cache_info(&wm, &cache, None, None);
        assert!(!split.static_prefix.contains("UNIQUE-DIALOGUE-MARKER"));
        assert!(!split.static_prefix.contains("UNIQUE-INPUT-MARKER"));
        assert_eq!(split.full_prompt, format!("{}{}", split.static_prefix, split.dynamic_suffix));
    }
}
