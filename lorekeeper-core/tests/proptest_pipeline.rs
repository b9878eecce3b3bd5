//! Property-based tests for pipeline invariants.
//!
//! Prefix determinism, split integrity, validator precedence, and
//! reproducible escalation under random inputs.

use proptest::prelude::*;

use lorekeeper_core::validation::validate;
use lorekeeper_core::{
    CacheBoundary, Constraint, ConstraintSet, DialogueTurn, InteractionSnapshot, KvCacheConfig,
    MemoryStore, MutationSource, PrefixStabilityValidator, PromptAssembler,
    PromptAssemblerConfig, RetryPolicy, ValidationOutcome, WorkingMemory, WorkingMemoryConfig,
};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_boundary() -> impl Strategy<Value = CacheBoundary> {
    prop_oneof![
        Just(CacheBoundary::AfterSystemPrompt),
        Just(CacheBoundary::AfterCanonicalFacts),
        Just(CacheBoundary::AfterWorldState),
        Just(CacheBoundary::AfterConstraints),
    ]
}

fn arb_line() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z ,.]{0,40}"
}

fn arb_dialogue() -> impl Strategy<Value = Vec<DialogueTurn>> {
    prop::collection::vec((arb_line(), arb_line()), 0..6)
        .prop_map(|turns| turns.into_iter().map(|(s, t)| DialogueTurn::new(s, t)).collect())
}

#[derive(Debug, Clone)]
struct StaticSections {
    system: String,
    facts: Vec<String>,
    world: Vec<String>,
    rules: Vec<String>,
}

fn arb_static() -> impl Strategy<Value = StaticSections> {
    (
        arb_line(),
        prop::collection::vec(arb_line(), 0..4),
        prop::collection::vec(arb_line(), 0..4),
        prop::collection::vec(arb_line(), 0..3),
    )
        .prop_map(|(system, facts, world, rules)| StaticSections {
            system,
            facts,
            world,
            rules,
        })
}

#[derive(Debug, Clone)]
struct DynamicSections {
    input: String,
    dialogue: Vec<DialogueTurn>,
    memories: Vec<String>,
    attempt: u32,
}

fn arb_dynamic() -> impl Strategy<Value = DynamicSections> {
    (
        arb_line(),
        arb_dialogue(),
        prop::collection::vec(arb_line(), 0..3),
        1u32..4,
    )
        .prop_map(|(input, dialogue, memories, attempt)| DynamicSections {
            input,
            dialogue,
            memories,
            attempt,
        })
}

fn working_memory(s: &StaticSections, d: &DynamicSections) -> WorkingMemory {
    let constraints: ConstraintSet = s
        .rules
        .iter()
        .enumerate()
        .map(|(i, r)| Constraint::requirement(format!("rule-{i}"), r.clone(), Vec::<String>::new()))
        .collect();
    let snapshot = InteractionSnapshot::builder("npc")
        .system_prompt(s.system.clone())
        .canonical_facts(s.facts.clone())
        .world_state(s.world.clone())
        .constraints(constraints)
        .player_input(d.input.clone())
        .dialogue_history(d.dialogue.clone())
        .episodic_memories(d.memories.clone())
        .attempt_number(d.attempt)
        .build()
        .expect("valid snapshot");
    let config = WorkingMemoryConfig {
        max_context_chars: usize::MAX,
        ..WorkingMemoryConfig::default()
    };
    WorkingMemory::from_snapshot(&snapshot, &config)
}

fn assembler() -> PromptAssembler {
    PromptAssembler::new(PromptAssemblerConfig::default()).expect("valid config")
}

// ---------------------------------------------------------------------------
// Property: static prefix depends only on static sections
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn static_prefix_is_deterministic(
        s in arb_static(),
        a in arb_dynamic(),
        b in arb_dynamic(),
        boundary in arb_boundary(),
    ) {
        let cache = KvCacheConfig { boundary, ..KvCacheConfig::default() };
        let pa = assembler().assemble_with_cache_info(&working_memory(&s, &a), &cache, None, None);
        let pb = assembler().assemble_with_cache_info(&working_memory(&s, &b), &cache, Some("retry"), None);
        prop_assert_eq!(pa.static_prefix, pb.static_prefix);
    }

    #[test]
    fn split_is_lossless(
        s in arb_static(),
        d in arb_dynamic(),
        boundary in arb_boundary(),
        enable in any::<bool>(),
    ) {
        let cache = KvCacheConfig { boundary, enable_caching: enable, ..KvCacheConfig::default() };
        let p = assembler().assemble_with_cache_info(&working_memory(&s, &d), &cache, None, None);
        prop_assert_eq!(&p.full_prompt, &format!("{}{}", p.static_prefix, p.dynamic_suffix));
        prop_assert_eq!(p.total_char_count, p.static_prefix_char_count + p.dynamic_suffix_char_count);
        prop_assert_eq!(p.estimated_total_tokens, p.estimated_static_tokens + p.estimated_dynamic_tokens);
        prop_assert_eq!(p.breakdown.total(), p.total_char_count);
    }

    #[test]
    fn dialogue_never_enters_prefix(
        s in arb_static(),
        d in arb_dynamic(),
        boundary in arb_boundary(),
    ) {
        let cache = KvCacheConfig { boundary, ..KvCacheConfig::default() };
        let p = assembler().assemble_with_cache_info(&working_memory(&s, &d), &cache, None, None);
        prop_assert!(!p.static_prefix.contains("[Conversation]"));
        prop_assert!(p.dynamic_suffix.contains("[Conversation]"));
    }

    #[test]
    fn assemble_breakdown_matches_count(s in arb_static(), d in arb_dynamic()) {
        let p = assembler().assemble(&working_memory(&s, &d), Some("feedback"), Some("Bob"));
        prop_assert_eq!(p.breakdown.total(), p.character_count);
        prop_assert!(p.estimated_tokens >= 1);
    }
}

// ---------------------------------------------------------------------------
// Property: validator and retry policy
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn blank_text_is_always_invalid_format(ws in "[ \t\n]{0,10}", rules in prop::collection::vec(arb_line(), 0..4)) {
        let set: ConstraintSet = rules
            .iter()
            .enumerate()
            .map(|(i, r)| Constraint::prohibition(format!("p{i}"), r.clone(), [r.as_str()]))
            .collect();
        prop_assert_eq!(validate(&ws, &set).outcome, ValidationOutcome::InvalidFormat);
    }

    #[test]
    fn prohibition_beats_satisfied_requirement(word in "[a-z]{3,10}", filler in arb_line()) {
        let set = ConstraintSet::from(vec![
            Constraint::requirement("req", "say the word", [word.as_str()]),
            Constraint::prohibition("ban", "never say the word", [word.as_str()]),
        ]);
        let text = format!("{filler} {word}");
        prop_assert_eq!(validate(&text, &set).outcome, ValidationOutcome::ProhibitionViolated);
    }

    #[test]
    fn escalation_is_reproducible(word in "[a-z]{3,10}", attempt in 1u32..10) {
        let set = ConstraintSet::from(vec![
            Constraint::prohibition("ban", "never say it", [word.as_str()]),
            Constraint::requirement("greet", "greet", ["hello"]),
        ]);
        let violations = validate(&format!("so {word}"), &set).violations;
        let policy = RetryPolicy::default();
        let a = policy.generate_retry_constraints(&violations, attempt);
        let b = policy.generate_retry_constraints(&violations, attempt);
        prop_assert_eq!(a, b);
    }
}

// ---------------------------------------------------------------------------
// Property: memory store authority and prefix auditor
// ---------------------------------------------------------------------------

fn arb_source() -> impl Strategy<Value = MutationSource> {
    prop_oneof![
        Just(MutationSource::ValidatedOutput),
        Just(MutationSource::GameSystem),
        Just(MutationSource::Designer),
    ]
}

proptest! {
    #[test]
    fn world_state_write_succeeds_iff_rank_not_lower(first in arb_source(), second in arb_source()) {
        let store = MemoryStore::new("npc").expect("valid");
        store.set_world_state("k", "v1", first).expect("valid");
        let result = store.set_world_state("k", "v2", second).expect("valid");
        prop_assert_eq!(result.success, second >= first);
        let expected = if second >= first { "v2" } else { "v1" };
        prop_assert_eq!(store.world_state("k").map(|e| e.value), Some(expected.to_string()));
    }

    #[test]
    fn auditor_flags_exactly_changed_prefixes(
        prefixes in prop::collection::vec("[ab]{1,3}", 1..20),
        boundary in arb_boundary(),
    ) {
        let auditor = PrefixStabilityValidator::new();
        let mut expected = 0u64;
        for (i, prefix) in prefixes.iter().enumerate() {
            let violation = auditor.validate("npc", prefix, boundary).expect("no throw");
            let changed = i > 0 && prefixes[i - 1] != *prefix;
            prop_assert_eq!(violation.is_some(), changed);
            if changed {
                expected += 1;
            }
        }
        prop_assert_eq!(auditor.violation_count(), expected);
    }

    #[test]
    fn decay_is_monotonic_and_non_negative(sig in 0.0f32..=1.0, ticks in 1usize..50) {
        let store = MemoryStore::new("npc").expect("valid");
        store.add_episodic_memory("event", sig, "e", MutationSource::GameSystem).expect("valid");
        let mut last = sig;
        for _ in 0..ticks {
            store.apply_decay_tick();
            let now = store.recent_memories(1)[0].significance;
            prop_assert!(now <= last && now >= 0.0);
            last = now;
        }
    }
}
