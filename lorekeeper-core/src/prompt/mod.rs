//! Prompt assembly.
//!
//! Serializes a [`WorkingMemory`] into model input. Two layouts exist:
//!
//! - [`PromptAssembler::assemble`] uses the reading order
//!   system → context → facts → world state → memories → beliefs →
//!   retry feedback → rules → conversation → player → cue.
//! - [`PromptAssembler::assemble_with_cache_info`] moves every
//!   cache-eligible section (system, facts, world state, rules) to the
//!   front and cuts at a [`CacheBoundary`]. Everything that varies per
//!   request (memories, beliefs, retry feedback, dialogue, player input)
//!   stays after the cut for every boundary.

pub mod cache;
pub mod stability;
pub mod token;

pub use cache::{CacheBoundary, CachedPrompt, KvCacheConfig};
pub use stability::{PrefixStabilityValidator, PrefixViolation};
pub use token::estimate_tokens;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LoreError, Result};
use crate::types::{LogSink, char_len, emit};
use crate::working_memory::WorkingMemory;

/// Prompt text layout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptAssemblerConfig {
    /// Ratio used for token estimates.
    pub chars_per_token: f32,
    /// Render the rules block.
    pub include_constraints: bool,
    /// Line opening the memory sections.
    pub context_header: String,
    /// Line opening the rules block.
    pub constraints_header: String,
    /// Line opening the dialogue.
    pub conversation_header: String,
    /// Cue name when the working memory has none.
    pub default_npc_name: String,
    /// Speaker label for the player's line.
    pub player_label: String,
}

impl Default for PromptAssemblerConfig {
    fn default() -> Self {
        Self {
            chars_per_token: token::DEFAULT_CHARS_PER_TOKEN,
            include_constraints: true,
            context_header: "[Context]".to_string(),
            constraints_header: "[Rules]".to_string(),
            conversation_header: "[Conversation]".to_string(),
            default_npc_name: "NPC".to_string(),
            player_label: "Player".to_string(),
        }
    }
}

/// Named prompt sections, in reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSection {
    /// `System: …`
    SystemPrompt,
    /// Context header line.
    ContextHeader,
    /// Canonical facts list.
    CanonicalFacts,
    /// World-state list.
    WorldState,
    /// Episodic memories list.
    EpisodicMemories,
    /// Beliefs list.
    Beliefs,
    /// Feedback from a rejected attempt.
    RetryFeedback,
    /// Rules block.
    Constraints,
    /// Conversation header line.
    ConversationHeader,
    /// Prior dialogue turns.
    DialogueHistory,
    /// The player's line.
    PlayerInput,
    /// `Name:` the model completes.
    ResponseCue,
}

/// Character counts per rendered section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionBreakdown {
    entries: Vec<(PromptSection, usize)>,
}

impl SectionBreakdown {
    fn record(&mut self, section: PromptSection, chars: usize) {
        match self.entries.iter_mut().find(|(s, _)| *s == section) {
            Some((_, n)) => *n += chars,
            None => self.entries.push((section, chars)),
        }
    }

    /// Characters attributed to `section` (0 if absent).
    #[must_use]
    pub fn get(&self, section: PromptSection) -> usize {
        self.entries
            .iter()
            .find(|(s, _)| *s == section)
            .map_or(0, |(_, n)| *n)
    }

    /// Sum over all sections; equals the prompt's character count.
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, n)| n).sum()
    }

    /// Sections in the order they appear in the prompt.
    pub fn iter(&self) -> impl Iterator<Item = (PromptSection, usize)> + '_ {
        self.entries.iter().copied()
    }
}

/// Prompt text with size metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledPrompt {
    /// Full prompt.
    pub text: String,
    /// Characters in `text`.
    pub character_count: usize,
    /// Token estimate for `text`.
    pub estimated_tokens: usize,
    /// Per-section character counts.
    pub breakdown: SectionBreakdown,
}

/// One rendered piece of the prompt.
struct Segment {
    section: PromptSection,
    text: String,
    /// Earliest boundary whose prefix includes this segment; `None` means
    /// always dynamic.
    tier: Option<CacheBoundary>,
}

/// Turns working memory into prompt text.
#[derive(Clone)]
pub struct PromptAssembler {
    config: PromptAssemblerConfig,
    log_sink: Option<LogSink>,
}

impl std::fmt::Debug for PromptAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptAssembler")
            .field("config", &self.config)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

impl PromptAssembler {
    /// Create an assembler.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`] if `chars_per_token` is not a
    /// positive finite number.
    pub fn new(config: PromptAssemblerConfig) -> Result<Self> {
        if !(config.chars_per_token.is_finite() && config.chars_per_token > 0.0) {
            return Err(LoreError::invalid(
                "chars_per_token",
                format!("must be positive, got {}", config.chars_per_token),
            ));
        }
        Ok(Self {
            config,
            log_sink: None,
        })
    }

    /// Attach a diagnostics sink.
    #[must_use]
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &PromptAssemblerConfig {
        &self.config
    }

    /// Render the prompt in reading order.
    #[must_use]
    pub fn assemble(
        &self,
        memory: &WorkingMemory,
        retry_feedback: Option<&str>,
        npc_name: Option<&str>,
    ) -> AssembledPrompt {
        let has_context = !(memory.canonical_facts().is_empty()
            && memory.world_state().is_empty()
            && memory.episodic_memories().is_empty()
            && memory.beliefs().is_empty());

        let mut segments = vec![self.system_segment(memory)];
        if has_context {
            segments.push(self.context_header(None));
        }
        segments.push(Segment {
            section: PromptSection::CanonicalFacts,
            text: list_block("Facts", memory.canonical_facts()),
            tier: None,
        });
        segments.push(Segment {
            section: PromptSection::WorldState,
            text: list_block("Current state", memory.world_state()),
            tier: None,
        });
        segments.extend(self.volatile_segments(memory, retry_feedback, npc_name));
        // Rules go after retry feedback in reading order.
        let tail_start = segments
            .iter()
            .position(|s| s.section == PromptSection::ConversationHeader)
            .unwrap_or(segments.len());
        segments.insert(tail_start, self.constraints_segment(memory, None));

        let (text, breakdown) = join(&segments);
        let character_count = char_len(&text);
        let estimated_tokens = estimate_tokens(&text, self.config.chars_per_token);

        debug!(
            npc_id = %memory.npc_id(),
            chars = character_count,
            tokens = estimated_tokens,
            "assembled prompt"
        );
        emit(self.log_sink.as_ref(), || {
            format!("assemble npc={} chars={character_count} tokens={estimated_tokens}", memory.npc_id())
        });

        AssembledPrompt {
            text,
            character_count,
            estimated_tokens,
            breakdown,
        }
    }

    /// Render the prompt in cache order and split it at the configured
    /// boundary.
    #[must_use]
    pub fn assemble_with_cache_info(
        &self,
        memory: &WorkingMemory,
        cache: &KvCacheConfig,
        retry_feedback: Option<&str>,
        npc_name: Option<&str>,
    ) -> CachedPrompt {
        let facts = memory.canonical_facts();
        let world = memory.world_state();

        let mut segments = vec![self.system_segment(memory)];
        if !facts.is_empty() {
            segments.push(self.context_header(Some(CacheBoundary::AfterCanonicalFacts)));
            segments.push(Segment {
                section: PromptSection::CanonicalFacts,
                text: list_block("Facts", facts),
                tier: Some(CacheBoundary::AfterCanonicalFacts),
            });
        }
        if !world.is_empty() {
            if facts.is_empty() {
                segments.push(self.context_header(Some(CacheBoundary::AfterWorldState)));
            }
            segments.push(Segment {
                section: PromptSection::WorldState,
                text: list_block("Current state", world),
                tier: Some(CacheBoundary::AfterWorldState),
            });
        }
        segments.push(self.constraints_segment(memory, Some(CacheBoundary::AfterConstraints)));

        let header_emitted = !(facts.is_empty() && world.is_empty());
        let needs_header = !header_emitted
            && !(memory.episodic_memories().is_empty() && memory.beliefs().is_empty());
        if needs_header {
            segments.push(self.context_header(None));
        }
        segments.extend(self.volatile_segments(memory, retry_feedback, npc_name));

        let boundary = cache.boundary;
        let split = if cache.enable_caching {
            segments
                .iter()
                .position(|s| !s.tier.is_some_and(|t| t <= boundary))
                .unwrap_or(segments.len())
        } else {
            0
        };

        let (static_prefix, _) = join(&segments[..split]);
        let (dynamic_suffix, _) = join(&segments[split..]);
        let (full_prompt, breakdown) = join(&segments);

        let cpt = self.config.chars_per_token;
        let estimated_static_tokens = estimate_tokens(&static_prefix, cpt);
        let estimated_dynamic_tokens = estimate_tokens(&dynamic_suffix, cpt);
        let static_prefix_char_count = char_len(&static_prefix);
        let dynamic_suffix_char_count = char_len(&dynamic_suffix);

        debug!(
            npc_id = %memory.npc_id(),
            %boundary,
            caching = cache.enable_caching,
            static_tokens = estimated_static_tokens,
            dynamic_tokens = estimated_dynamic_tokens,
            "assembled cache-split prompt"
        );
        emit(self.log_sink.as_ref(), || {
            format!(
                "cache split npc={} boundary={boundary} static_chars={static_prefix_char_count} dynamic_chars={dynamic_suffix_char_count}",
                memory.npc_id()
            )
        });

        CachedPrompt {
            static_prefix,
            dynamic_suffix,
            boundary,
            caching_enabled: cache.enable_caching,
            full_prompt,
            estimated_static_tokens,
            estimated_dynamic_tokens,
            estimated_total_tokens: estimated_static_tokens + estimated_dynamic_tokens,
            static_prefix_char_count,
            dynamic_suffix_char_count,
            total_char_count: static_prefix_char_count + dynamic_suffix_char_count,
            n_keep_tokens: cache.n_keep_tokens,
            breakdown,
        }
    }

    fn system_segment(&self, memory: &WorkingMemory) -> Segment {
        let prompt = memory.system_prompt().trim();
        Segment {
            section: PromptSection::SystemPrompt,
            text: if prompt.is_empty() {
                String::new()
            } else {
                format!("System: {prompt}\n\n")
            },
            tier: Some(CacheBoundary::AfterSystemPrompt),
        }
    }

    fn context_header(&self, tier: Option<CacheBoundary>) -> Segment {
        Segment {
            section: PromptSection::ContextHeader,
            text: format!("{}\n", self.config.context_header),
            tier,
        }
    }

    fn constraints_segment(&self, memory: &WorkingMemory, tier: Option<CacheBoundary>) -> Segment {
        let lines: Vec<String> = memory
            .constraints()
            .iter()
            .map(|c| c.prompt_line().trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        let text = if self.config.include_constraints && !lines.is_empty() {
            let mut block = format!("{}\n", self.config.constraints_header);
            for line in lines {
                block.push_str(&format!("- {line}\n"));
            }
            block
        } else {
            String::new()
        };
        Segment {
            section: PromptSection::Constraints,
            text,
            tier,
        }
    }

    /// Memories through the response cue; never cache-eligible.
    fn volatile_segments(
        &self,
        memory: &WorkingMemory,
        retry_feedback: Option<&str>,
        npc_name: Option<&str>,
    ) -> Vec<Segment> {
        let dynamic = |section, text| Segment {
            section,
            text,
            tier: None,
        };

        let mut out = vec![
            dynamic(
                PromptSection::EpisodicMemories,
                list_block("Memories", memory.episodic_memories()),
            ),
            dynamic(PromptSection::Beliefs, list_block("Beliefs", memory.beliefs())),
        ];
        if let Some(feedback) = retry_feedback.map(str::trim_end).filter(|f| !f.trim().is_empty()) {
            out.push(dynamic(PromptSection::RetryFeedback, format!("{feedback}\n")));
        }
        out.push(dynamic(
            PromptSection::ConversationHeader,
            format!("\n{}\n", self.config.conversation_header),
        ));

        let mut history = String::new();
        for turn in memory.dialogue_history() {
            history.push_str(&format!("{}\n", turn.render()));
        }
        out.push(dynamic(PromptSection::DialogueHistory, history));

        let input = memory.player_input().trim();
        if !input.is_empty() {
            out.push(dynamic(
                PromptSection::PlayerInput,
                format!("{}: {input}\n", self.config.player_label),
            ));
        }

        let name = npc_name
            .or(memory.npc_name())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.config.default_npc_name);
        out.push(dynamic(PromptSection::ResponseCue, format!("{name}:")));
        out
    }
}

fn list_block(title: &str, items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut block = format!("{title}:\n");
    for item in items {
        block.push_str(&format!("- {item}\n"));
    }
    block
}

fn join(segments: &[Segment]) -> (String, SectionBreakdown) {
    let mut text = String::new();
    let mut breakdown = SectionBreakdown::default();
    for segment in segments.iter().filter(|s| !s.text.is_empty()) {
        text.push_str(&segment.text);
        breakdown.record(segment.section, char_len(&segment.text));
    }
    (text, breakdown)
}
