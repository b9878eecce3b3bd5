//! Context retrieval: relevance-bounded subsets of a [`MemoryStore`].
//!
//! Each memory kind is handled independently:
//!
//! 1. drop candidates failing the kind's exclusion filter
//!    (strength, confidence, contradiction)
//! 2. score the rest by keyword overlap with the query and topic tags
//! 3. drop zero scores, sort by score, break ties by recency
//!    (episodic) or insertion order (everything else)
//! 4. apply the kind's hard cap
//!
//! Retrieval never mutates the store.
//!
//! [`ContextRetriever::retrieve_for_prompt`] pins canonical facts and world
//! state to insertion order when working memory always includes them, so the
//! cacheable prompt prefix does not depend on the query.

pub mod scoring;

use std::cmp::Reverse;
use std::collections::BTreeSet;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::memory::{MemoryStore, WorldStateEntry};
use crate::types::{LogSink, emit};
use crate::working_memory::WorkingMemoryConfig;

/// Bounded, rendered context for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    /// Canonical fact texts, most relevant first.
    pub canonical_facts: Vec<String>,
    /// World state rendered as `key: value`.
    pub world_state: Vec<String>,
    /// Episodic memory contents.
    pub episodic_memories: Vec<String>,
    /// Beliefs rendered with subject and confidence.
    pub beliefs: Vec<String>,
    /// Sum of the four section lengths.
    pub total_count: usize,
    /// Whether any section is non-empty.
    pub has_content: bool,
}

impl RetrievedContext {
    fn from_sections(
        canonical_facts: Vec<String>,
        world_state: Vec<String>,
        episodic_memories: Vec<String>,
        beliefs: Vec<String>,
    ) -> Self {
        let total_count =
            canonical_facts.len() + world_state.len() + episodic_memories.len() + beliefs.len();
        Self {
            canonical_facts,
            world_state,
            episodic_memories,
            beliefs,
            total_count,
            has_content: total_count > 0,
        }
    }
}

/// Candidate waiting to be ranked.
struct Scored {
    score: OrderedFloat<f64>,
    /// Secondary key; lower sorts first.
    tiebreak: u64,
    rendered: String,
}

/// Sort by score descending then `tiebreak` ascending, and keep `cap`.
fn rank(mut items: Vec<Scored>, cap: usize) -> Vec<String> {
    items.retain(|s| s.score.0 > 0.0);
    items.sort_by_key(|s| (Reverse(s.score), s.tiebreak));
    items.into_iter().take(cap).map(|s| s.rendered).collect()
}

/// Scores and filters store content for a query.
#[derive(Clone, Default)]
pub struct ContextRetriever {
    config: RetrievalConfig,
    log_sink: Option<LogSink>,
}

impl std::fmt::Debug for ContextRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRetriever")
            .field("config", &self.config)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

impl ContextRetriever {
    /// Create a retriever with the given caps and filters.
    #[must_use]
    pub fn new(config: RetrievalConfig) -> Self {
        Self {
            config,
            log_sink: None,
        }
    }

    /// Attach a diagnostics sink.
    #[must_use]
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve the most relevant entries of every kind for `query`.
    ///
    /// `topics` are optional tags matched against domains, categories,
    /// keys, and subjects. An empty query with no topics yields an empty
    /// context.
    #[must_use]
    pub fn retrieve(&self, store: &MemoryStore, query: &str, topics: &[&str]) -> RetrievedContext {
        let keywords = scoring::keywords(query);
        let topics = scoring::normalize_topics(topics);
        emit(self.log_sink.as_ref(), || {
            format!(
                "retrieve persona={} keywords={} topics={}",
                store.persona_id(),
                keywords.len(),
                topics.len()
            )
        });

        if keywords.is_empty() && topics.is_empty() {
            emit(self.log_sink.as_ref(), || "retrieve: nothing to match".to_string());
            return RetrievedContext::default();
        }

        let context = RetrievedContext::from_sections(
            self.facts(store, &keywords, &topics),
            self.world(store, &keywords, &topics),
            self.episodic(store, &keywords, &topics),
            self.beliefs(store, &keywords, &topics),
        );

        debug!(
            persona = %store.persona_id(),
            facts = context.canonical_facts.len(),
            world_state = context.world_state.len(),
            episodic = context.episodic_memories.len(),
            beliefs = context.beliefs.len(),
            "retrieved context"
        );
        emit(self.log_sink.as_ref(), || {
            format!(
                "retrieve: facts={} world_state={} episodic={} beliefs={}",
                context.canonical_facts.len(),
                context.world_state.len(),
                context.episodic_memories.len(),
                context.beliefs.len()
            )
        });
        context
    }

    /// Like [`Self::retrieve`], but sections that `working` always includes
    /// list the store's entries in insertion order, whatever the query.
    ///
    /// Pinned sections still honour the retrieval caps, keeping the first
    /// entries written.
    #[must_use]
    pub fn retrieve_for_prompt(
        &self,
        store: &MemoryStore,
        query: &str,
        topics: &[&str],
        working: &WorkingMemoryConfig,
    ) -> RetrievedContext {
        let ranked = self.retrieve(store, query, topics);
        if !working.always_include_canonical_facts && !working.always_include_world_state {
            return ranked;
        }

        let canonical_facts = if working.always_include_canonical_facts {
            store
                .canonical_facts()
                .into_iter()
                .take(self.config.max_canonical_facts)
                .map(|fact| fact.text)
                .collect()
        } else {
            ranked.canonical_facts
        };
        let world_state = if working.always_include_world_state {
            store
                .all_world_state()
                .iter()
                .take(self.config.max_world_state)
                .map(WorldStateEntry::render)
                .collect()
        } else {
            ranked.world_state
        };
        emit(self.log_sink.as_ref(), || {
            format!(
                "retrieve: pinned facts={} world_state={}",
                canonical_facts.len(),
                world_state.len()
            )
        });
        RetrievedContext::from_sections(canonical_facts, world_state, ranked.episodic_memories, ranked.beliefs)
    }

    fn facts(
        &self,
        store: &MemoryStore,
        keywords: &BTreeSet<String>,
        topics: &BTreeSet<String>,
    ) -> Vec<String> {
        let scored = store
            .canonical_facts()
            .into_iter()
            .zip(0_u64..)
            .map(|(fact, order)| Scored {
                score: OrderedFloat(scoring::relevance(
                    keywords,
                    topics,
                    &fact.text,
                    &[fact.domain.as_str(), fact.id.as_str()],
                )),
                tiebreak: order,
                rendered: fact.text,
            })
            .collect();
        rank(scored, self.config.max_canonical_facts)
    }

    fn world(
        &self,
        store: &MemoryStore,
        keywords: &BTreeSet<String>,
        topics: &BTreeSet<String>,
    ) -> Vec<String> {
        let scored = store
            .all_world_state()
            .into_iter()
            .zip(0_u64..)
            .map(|(entry, order)| {
                let rendered = entry.render();
                Scored {
                    score: OrderedFloat(scoring::relevance(
                        keywords,
                        topics,
                        &rendered,
                        &[entry.key.as_str()],
                    )),
                    tiebreak: order,
                    rendered,
                }
            })
            .collect();
        rank(scored, self.config.max_world_state)
    }

    fn episodic(
        &self,
        store: &MemoryStore,
        keywords: &BTreeSet<String>,
        topics: &BTreeSet<String>,
    ) -> Vec<String> {
        let min_strength = self.config.min_episodic_strength;
        let scored = store
            .all_episodic_memories()
            .into_iter()
            .filter(|m| m.strength() >= min_strength)
            .map(|m| Scored {
                score: OrderedFloat(scoring::relevance(
                    keywords,
                    topics,
                    &m.content,
                    &[m.category.as_str()],
                )),
                // Newest first among equal scores.
                tiebreak: u64::MAX - m.sequence,
                rendered: m.content,
            })
            .collect();
        rank(scored, self.config.max_episodic_memories)
    }

    fn beliefs(
        &self,
        store: &MemoryStore,
        keywords: &BTreeSet<String>,
        topics: &BTreeSet<String>,
    ) -> Vec<String> {
        let min_confidence = self.config.min_belief_confidence;
        let include_contradicted = self.config.include_contradicted_beliefs;
        let scored = store
            .all_beliefs()
            .into_iter()
            .filter(|b| b.confidence >= min_confidence)
            .filter(|b| include_contradicted || !b.contradicted)
            .zip(0_u64..)
            .map(|(belief, order)| {
                let text = format!("{} {}", belief.subject, belief.content);
                Scored {
                    score: OrderedFloat(scoring::relevance(
                        keywords,
                        topics,
                        &text,
                        &[belief.subject.as_str()],
                    )),
                    tiebreak: order,
                    rendered: belief.render(),
                }
            })
            .collect();
        rank(scored, self.config.max_beliefs)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::types::MutationSource;

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new("npc-smith").expect("valid");
        store.add_canonical_fact("fact-1", "The king is Arthur", "lore").expect("valid");
        store.add_canonical_fact("fact-2", "The river flows north", "geography").expect("valid");
        store.set_world_state("weather", "raining", MutationSource::GameSystem).expect("valid");
        store.set_world_state("king_health", "ailing", MutationSource::GameSystem).expect("valid");
        store
            .add_episodic_memory("The king visited my forge", 0.8, "event", MutationSource::GameSystem)
            .expect("valid");
        store
            .add_episodic_memory("Sold a sword to the king's guard", 0.6, "trade", MutationSource::GameSystem)
            .expect("valid");
        store
            .set_belief("king", "is a fair ruler", 0.9, MutationSource::GameSystem)
            .expect("valid");
        store
    }

    #[test]
    fn query_matches_canonical_fact() {
        let store = seeded_store();
        let ctx = ContextRetriever::default().retrieve(&store, "king", &[]);
        assert!(ctx.has_content);
        assert!(ctx.canonical_facts.iter().any(|f| f.contains("Arthur")));
        assert!(!ctx.canonical_facts.iter().any(|f| f.contains("river")));
    }

    #[test]
    fn empty_query_and_empty_store_return_nothing() {
        let store = seeded_store();
        let retriever = ContextRetriever::default();
        let ctx = retriever.retrieve(&store, "", &[]);
        assert!(!ctx.has_content);
        assert_eq!(ctx.total_count, 0);

        let empty = MemoryStore::new("nobody").expect("valid");
        let ctx = retriever.retrieve(&empty, "king", &[]);
        assert!(!ctx.has_content);
        assert_eq!(ctx.total_count, 0);
    }

    #[test]
    fn caps_apply_after_sorting() {
        let store = seeded_store();
        let config = RetrievalConfig {
            max_episodic_memories: 1,
            ..RetrievalConfig::default()
        };
        let ctx = ContextRetriever::new(config).retrieve(&store, "king forge", &[]);
        assert_eq!(ctx.episodic_memories, vec!["The king visited my forge".to_string()]);
    }

    #[test]
    fn equal_scores_prefer_recent_memories() {
        let store = MemoryStore::new("npc").expect("valid");
        store.add_episodic_memory("old wolf sighting", 0.5, "e", MutationSource::GameSystem).expect("valid");
        store.add_episodic_memory("new wolf sighting", 0.5, "e", MutationSource::GameSystem).expect("valid");
        let ctx = ContextRetriever::default().retrieve(&store, "wolf", &[]);
        assert_eq!(ctx.episodic_memories[0], "new wolf sighting");
    }

    #[test]
    fn weak_memories_and_contradicted_beliefs_are_filtered() {
        let store = seeded_store();
        store
            .add_episodic_memory("The king sneezed", 0.05, "event", MutationSource::GameSystem)
            .expect("valid");
        store.mark_belief_contradicted("king", "heard he taxes widows").expect("valid");

        let ctx = ContextRetriever::default().retrieve(&store, "king", &[]);
        assert!(!ctx.episodic_memories.iter().any(|m| m.contains("sneezed")));
        assert!(ctx.beliefs.is_empty());

        let config = RetrievalConfig {
            include_contradicted_beliefs: true,
            ..RetrievalConfig::default()
        };
        let ctx = ContextRetriever::new(config).retrieve(&store, "king", &[]);
        assert_eq!(ctx.beliefs.len(), 1);
    }

    #[test]
    fn topics_alone_can_select_items() {
        let store = seeded_store();
        let ctx = ContextRetriever::default().retrieve(&store, "", &["geography"]);
        assert_eq!(ctx.canonical_facts, vec!["The river flows north".to_string()]);
    }

    #[test]
    fn log_sink_does_not_change_results() {
        let store = seeded_store();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let sink: LogSink = Arc::new(move |line: &str| {
            captured.lock().expect("lock").push(line.to_string());
        });

        let plain = ContextRetriever::default().retrieve(&store, "king", &[]);
        let logged = ContextRetriever::default()
            .with_log_sink(sink)
            .retrieve(&store, "king", &[]);
        assert_eq!(plain, logged);
        assert!(!lines.lock().expect("lock").is_empty());
    }
    #[test]
    fn pinned_sections_ignore_the_query() {
        let store = seeded_store();
        let retriever = ContextRetriever::default();
        let working = WorkingMemoryConfig::default();

        let king = retriever.retrieve_for_prompt(&store, "Who is the king?", &[], &working);
        let river = retriever.retrieve_for_prompt(&store, "Where does the river go?", &[], &working);
        let silent = retriever.retrieve_for_prompt(&store, "", &[], &working);
        for ctx in [&king, &river, &silent] {
            assert_eq!(
                ctx.canonical_facts,
                vec!["The king is Arthur".to_string(), "The river flows north".to_string()]
            );
            assert_eq!(
                ctx.world_state,
                vec!["weather: raining".to_string(), "king_health: ailing".to_string()]
            );
        }
        assert!(!king.episodic_memories.is_empty());
        assert!(silent.episodic_memories.is_empty());
        assert!(silent.has_content);
        assert_eq!(silent.total_count, 4);
    }

    #[test]
    fn unpinned_sections_stay_ranked() {
        let store = seeded_store();
        let working = WorkingMemoryConfig {
            always_include_canonical_facts: false,
            always_include_world_state: false,
            ..WorkingMemoryConfig::default()
        };
        let retriever = ContextRetriever::default();
        assert_eq!(
            retriever.retrieve_for_prompt(&store, "king", &[], &working),
            retriever.retrieve(&store, "king", &[])
        );
    }
}
