//! Dialogue pipeline: retrieve → snapshot → assemble → call → validate → retry.
//!
//! [`DialoguePipeline::send_message`] always returns a [`PipelineResult`].
//! Model-call faults become failed attempts that count against the retry
//! budget; only cancellation ends the loop early without a verdict, and a
//! cancelled request leaves every memory store untouched.
//!
//! ```text
//! Attempting(n) ──ok──► Validating ──valid──► Success
//!      ▲                    │
//!      │                 invalid
//!      │                    ▼
//!      └──escalate── n < max_attempts ? ──no──► Failed (fallback line)
//! ```

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use lorekeeper_core::validation::validate;
use lorekeeper_core::{
    CachedPrompt, ConstraintSet, ContextRetriever, DialogueTurn, InferenceResult,
    InteractionSnapshot, LogSink, LoreError, LorekeeperConfig, MemoryStore, MutationSource,
    PrefixStabilityValidator, PrefixViolation, PromptAssembler, WorkingMemory,
};
use lorekeeper_llm::{CompletionRequest, CompletionResponse, LlamaServerClient, LlmError, ModelClient};

use crate::fallback::{FailureReason, FallbackProvider, StaticFallback};
use crate::intents::IntentSink;
use crate::output::{ParsedOutput, WorldIntent, parse_output};

/// Significance given to memory notes from validated responses.
const VALIDATED_MEMORY_SIGNIFICANCE: f32 = 0.5;
/// Category of memory notes from validated responses.
const VALIDATED_MEMORY_CATEGORY: &str = "dialogue";

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

/// One player message addressed to an NPC.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueRequest {
    npc_id: String,
    player_input: String,
    npc_name: Option<String>,
    system_prompt: String,
    constraints: ConstraintSet,
    topics: Vec<String>,
    scene: Option<String>,
    trigger: Option<String>,
}

impl DialogueRequest {
    /// Request for `npc_id` with the player's text.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`] if `npc_id` is blank.
    pub fn new(npc_id: impl Into<String>, player_input: impl Into<String>) -> Result<Self, LoreError> {
        let npc_id = npc_id.into();
        if npc_id.trim().is_empty() {
            return Err(LoreError::invalid("npc_id", "must not be blank"));
        }
        Ok(Self {
            npc_id,
            player_input: player_input.into(),
            npc_name: None,
            system_prompt: String::new(),
            constraints: ConstraintSet::new(),
            topics: Vec::new(),
            scene: None,
            trigger: None,
        })
    }

    /// Name used for the response cue and dialogue history.
    #[must_use]
    pub fn with_npc_name(mut self, name: impl Into<String>) -> Self {
        self.npc_name = Some(name.into());
        self
    }

    /// Character persona and instructions.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Constraints the response must satisfy.
    #[must_use]
    pub fn with_constraints(mut self, constraints: ConstraintSet) -> Self {
        self.constraints = constraints;
        self
    }

    /// Topic tags that boost retrieval.
    #[must_use]
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Scene tag recorded in the snapshot.
    #[must_use]
    pub fn with_scene(mut self, scene: impl Into<String>) -> Self {
        self.scene = Some(scene.into());
        self
    }

    /// What started the interaction; also selects trigger fallbacks.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Target NPC.
    #[must_use]
    pub fn npc_id(&self) -> &str {
        &self.npc_id
    }

    /// Player text.
    #[must_use]
    pub fn player_input(&self) -> &str {
        &self.player_input
    }
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// An attempt passed validation.
    Success,
    /// No attempt passed; the response is a fallback line.
    Failed,
    /// The caller cancelled the request.
    Cancelled,
}

/// Outcome of [`DialoguePipeline::send_message`].
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// How the request ended.
    pub status: PipelineStatus,
    /// Text for the player: validated dialogue, fallback line, or empty when cancelled.
    pub response: String,
    /// Every completed attempt, in order.
    pub attempts: Vec<InferenceResult>,
    /// Why the fallback was used.
    pub failure_reason: Option<FailureReason>,
    /// Intents emitted to the sink.
    pub intents: Vec<WorldIntent>,
    /// Memory notes stored from the validated response.
    pub stored_memories: usize,
    /// Prefix changes seen while assembling this request.
    pub prefix_violations: Vec<PrefixViolation>,
    /// Wall time of the whole request in milliseconds.
    pub elapsed_ms: u64,
}

impl PipelineResult {
    /// Number of completed attempts.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// The last completed attempt.
    #[must_use]
    pub fn final_result(&self) -> Option<&InferenceResult> {
        self.attempts.last()
    }

    /// Whether an attempt passed validation.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Success
    }

    /// Whether the response is a fallback line.
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.status == PipelineStatus::Failed
    }
}

/// Per-NPC prompt-cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Model calls made.
    pub requests: u64,
    /// Estimated tokens in the static prefixes sent.
    pub static_tokens: u64,
    /// Prompt tokens the server evaluated.
    pub prompt_tokens: u64,
    /// Prompt tokens the server reported as cached.
    pub cached_tokens: u64,
}

impl CacheStats {
    /// Share of evaluated prompt tokens served from cache.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        if self.prompt_tokens == 0 {
            0.0
        } else {
            self.cached_tokens as f64 / self.prompt_tokens as f64
        }
    }
}

// ---------------------------------------------------------------------------
// DialoguePipeline
// ---------------------------------------------------------------------------

/// Orchestrates one NPC dialogue turn end to end.
pub struct DialoguePipeline {
    config: LorekeeperConfig,
    client: Arc<dyn ModelClient>,
    retriever: ContextRetriever,
    assembler: PromptAssembler,
    auditor: Arc<PrefixStabilityValidator>,
    fallback: Arc<dyn FallbackProvider>,
    intent_sink: Option<Arc<dyn IntentSink>>,
    stores: DashMap<String, Arc<MemoryStore>>,
    histories: DashMap<String, Vec<DialogueTurn>>,
    cache_stats: DashMap<String, CacheStats>,
}

impl std::fmt::Debug for DialoguePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialoguePipeline")
            .field("npcs", &self.stores.len())
            .field("has_intent_sink", &self.intent_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl DialoguePipeline {
    /// Pipeline over `client` configured by `config`.
    ///
    /// # Errors
    /// Returns [`LoreError::Config`] if `config` fails validation.
    pub fn new(config: LorekeeperConfig, client: Arc<dyn ModelClient>) -> Result<Self, LoreError> {
        config.validate()?;
        let assembler = PromptAssembler::new(config.prompt.clone())?;
        info!(
            boundary = %config.kv_cache.boundary,
            caching = config.kv_cache.enable_caching,
            max_attempts = config.retry.max_attempts(),
            "dialogue pipeline ready"
        );
        Ok(Self {
            retriever: ContextRetriever::new(config.retrieval.clone()),
            assembler,
            config,
            client,
            auditor: Arc::new(PrefixStabilityValidator::new()),
            fallback: Arc::new(StaticFallback::default()),
            intent_sink: None,
            stores: DashMap::new(),
            histories: DashMap::new(),
            cache_stats: DashMap::new(),
        })
    }

    /// Pipeline over a llama.cpp server at `config.llm.base_url`.
    ///
    /// # Errors
    /// Returns [`LoreError::Config`] if `config` fails validation or the
    /// client settings are rejected.
    pub fn with_llama_server(config: LorekeeperConfig) -> Result<Self, LoreError> {
        let client = LlamaServerClient::new(config.llm.base_url.clone(), config.llm.request_timeout_ms)
            .map_err(|e| LoreError::Config(e.to_string()))?;
        Self::new(config, Arc::new(client))
    }

    /// Use `fallback` when every attempt fails.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackProvider>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Send validated intents to `sink`.
    #[must_use]
    pub fn with_intent_sink(mut self, sink: Arc<dyn IntentSink>) -> Self {
        self.intent_sink = Some(sink);
        self
    }

    /// Share a prefix auditor with other components.
    #[must_use]
    pub fn with_auditor(mut self, auditor: Arc<PrefixStabilityValidator>) -> Self {
        self.auditor = auditor;
        self
    }

    /// Route retriever and assembler diagnostics to `sink`.
    #[must_use]
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.retriever = self.retriever.with_log_sink(Arc::clone(&sink));
        self.assembler = self.assembler.with_log_sink(sink);
        self
    }

    /// Attach an existing memory store, replacing any store for the same persona.
    pub fn register_store(&self, store: Arc<MemoryStore>) {
        self.stores.insert(store.persona_id().to_string(), store);
    }

    /// Memory store for `npc_id`, created empty on first use.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidArgument`] if `npc_id` is blank.
    pub fn store(&self, npc_id: &str) -> Result<Arc<MemoryStore>, LoreError> {
        if let Some(store) = self.stores.get(npc_id) {
            return Ok(Arc::clone(store.value()));
        }
        let store = Arc::new(MemoryStore::with_config(npc_id, self.config.memory.clone())?);
        Ok(Arc::clone(
            self.stores.entry(npc_id.to_string()).or_insert(store).value(),
        ))
    }

    /// Conversation so far with `npc_id`, at most
    /// `working_memory.max_dialogue_turns` turns.
    #[must_use]
    pub fn history(&self, npc_id: &str) -> Vec<DialogueTurn> {
        self.histories.get(npc_id).map(|h| h.clone()).unwrap_or_default()
    }

    /// Forget the conversation with `npc_id`.
    pub fn clear_history(&self, npc_id: &str) {
        self.histories.remove(npc_id);
    }

    /// Prompt-cache counters for `npc_id`.
    #[must_use]
    pub fn cache_stats(&self, npc_id: &str) -> Option<CacheStats> {
        self.cache_stats.get(npc_id).map(|s| *s)
    }

    /// The prefix auditor in use.
    #[must_use]
    pub fn auditor(&self) -> &PrefixStabilityValidator {
        &self.auditor
    }

    /// Run the full retry loop for one player message.
    pub async fn send_message(&self, request: &DialogueRequest) -> PipelineResult {
        self.send_message_with_cancel(request, std::future::pending::<()>()).await
    }

    /// [`Self::send_message`] that stops as soon as `cancel` resolves.
    ///
    /// A cancelled request reports [`PipelineStatus::Cancelled`]; the
    /// interrupted attempt is not recorded and no memory is written.
    pub async fn send_message_with_cancel<F>(&self, request: &DialogueRequest, cancel: F) -> PipelineResult
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        tokio::pin!(cancel);

        let mut run = Run::new(request.npc_id());
        let base = match self.base_snapshot(request) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(npc_id = %request.npc_id(), error = %e, "rejected dialogue request");
                return run.fail(self.fallback.as_ref(), None, FailureReason::InvalidRequest, started);
            }
        };
        let (snapshot_base, store) = base;

        let policy = &self.config.retry;
        let budget = Duration::from_millis(policy.max_total_time_ms);
        let mut escalated = ConstraintSet::new();
        let mut feedback: Option<String> = None;

        for attempt in 1..=policy.max_attempts() {
            if attempt > 1 {
                if started.elapsed() >= budget {
                    warn!(npc_id = %request.npc_id(), attempt, "time budget exhausted before retry");
                    return run.fail(
                        self.fallback.as_ref(),
                        Some(&snapshot_base),
                        FailureReason::TimeBudgetExceeded,
                        started,
                    );
                }
                if policy.retry_delay_ms > 0 {
                    tokio::select! {
                        biased;
                        () = &mut cancel => return run.cancelled(started),
                        () = tokio::time::sleep(Duration::from_millis(policy.retry_delay_ms)) => {}
                    }
                }
            }

            let snapshot = match snapshot_base
                .to_builder()
                .attempt_number(attempt)
                .extra_constraints(escalated.clone())
                .build()
            {
                Ok(s) => Arc::new(s),
                Err(e) => {
                    warn!(npc_id = %request.npc_id(), error = %e, "could not build attempt snapshot");
                    return run.fail(
                        self.fallback.as_ref(),
                        Some(&snapshot_base),
                        FailureReason::InvalidRequest,
                        started,
                    );
                }
            };

            let memory = WorkingMemory::from_snapshot(&snapshot, &self.config.working_memory);
            let prompt = self.assembler.assemble_with_cache_info(
                &memory,
                &self.config.kv_cache,
                feedback.as_deref(),
                request.npc_name.as_deref(),
            );
            if attempt == 1 {
                self.audit_prefix(request.npc_id(), &prompt, &mut run);
            }

            let completion = CompletionRequest::new(prompt.full_prompt.clone())
                .with_max_tokens(self.config.llm.max_tokens)
                .with_temperature(self.config.llm.temperature)
                .with_seed(self.config.llm.seed)
                .with_cache(prompt.caching_enabled, prompt.n_keep_tokens);

            debug!(
                npc_id = %request.npc_id(),
                attempt,
                static_tokens = prompt.estimated_static_tokens,
                dynamic_tokens = prompt.estimated_dynamic_tokens,
                "calling model"
            );
            let call_started = Instant::now();
            let remaining = budget.saturating_sub(started.elapsed());
            let outcome = tokio::select! {
                biased;
                () = &mut cancel => Err(LlmError::Cancelled),
                r = tokio::time::timeout(remaining, self.client.complete(&completion)) => {
                    r.unwrap_or_else(|_| Err(LlmError::Timeout(remaining_ms(remaining))))
                }
            };
            let call_ms = millis(call_started);

            let (result, parsed) = match outcome {
                Err(LlmError::Cancelled) => {
                    info!(npc_id = %request.npc_id(), attempt, "dialogue request cancelled");
                    return run.cancelled(started);
                }
                Err(e @ LlmError::Timeout(_)) if started.elapsed() >= budget => {
                    warn!(npc_id = %request.npc_id(), attempt, error = %e, "time budget exhausted during model call");
                    run.attempts.push(InferenceResult::collaborator_failure(
                        Arc::clone(&snapshot),
                        e.to_string(),
                        call_ms,
                    ));
                    return run.fail(
                        self.fallback.as_ref(),
                        Some(&snapshot_base),
                        FailureReason::TimeBudgetExceeded,
                        started,
                    );
                }
                Err(e) => {
                    warn!(npc_id = %request.npc_id(), attempt, error = %e, "model call failed");
                    (
                        InferenceResult::collaborator_failure(Arc::clone(&snapshot), e.to_string(), call_ms),
                        ParsedOutput::default(),
                    )
                }
                Ok(response) => {
                    self.record_cache_stats(request.npc_id(), &prompt, &response);
                    let parsed = parse_output(&response.content);
                    let validation = validate(&parsed.dialogue, snapshot.constraints());
                    let result = InferenceResult {
                        attempt_number: attempt,
                        response: parsed.dialogue.clone(),
                        validation,
                        snapshot: Arc::clone(&snapshot),
                        prompt_tokens: response.prompt_token_count,
                        generated_tokens: response.generated_token_count,
                        cached_tokens: response.cached_token_count,
                        elapsed_ms: call_ms,
                        collaborator_error: None,
                    };
                    (result, parsed)
                }
            };

            if result.is_valid() {
                info!(npc_id = %request.npc_id(), attempt, "response accepted");
                let response = result.response.clone();
                run.attempts.push(result);
                self.commit(request, &store, &response, parsed, &mut run);
                return run.succeed(response, started);
            }

            debug!(
                npc_id = %request.npc_id(),
                attempt,
                outcome = ?result.validation.outcome,
                violations = result.validation.violations.len(),
                "response rejected"
            );
            if policy.should_retry(attempt) {
                escalated.extend(policy.generate_retry_constraints(&result.validation.violations, attempt));
                feedback = Some(policy.generate_retry_feedback(&result));
            }
            run.attempts.push(result);
        }

        warn!(
            npc_id = %request.npc_id(),
            attempts = run.attempts.len(),
            "every attempt failed; using fallback"
        );
        run.fail(
            self.fallback.as_ref(),
            Some(&snapshot_base),
            FailureReason::RetriesExhausted,
            started,
        )
    }

    fn base_snapshot(&self, request: &DialogueRequest) -> Result<(InteractionSnapshot, Arc<MemoryStore>), LoreError> {
        let store = self.store(request.npc_id())?;
        let topics: Vec<&str> = request.topics.iter().map(String::as_str).collect();
        let context = self.retriever.retrieve_for_prompt(
            &store,
            request.player_input(),
            &topics,
            &self.config.working_memory,
        );

        let mut builder = InteractionSnapshot::builder(request.npc_id())
            .system_prompt(request.system_prompt.clone())
            .player_input(request.player_input())
            .constraints(request.constraints.clone())
            .retrieved(context)
            .dialogue_history(self.history(request.npc_id()));
        if let Some(name) = &request.npc_name {
            builder = builder.npc_name(name.clone());
        }
        if let Some(scene) = &request.scene {
            builder = builder.scene(scene.clone());
        }
        if let Some(trigger) = &request.trigger {
            builder = builder.trigger(trigger.clone());
        }
        Ok((builder.build()?, store))
    }

    fn audit_prefix(&self, npc_id: &str, prompt: &CachedPrompt, run: &mut Run) {
        match self.auditor.validate_prompt(npc_id, prompt) {
            Ok(Some(violation)) => run.prefix_violations.push(violation),
            Ok(None) => {}
            Err(LoreError::PrefixInstability {
                key,
                boundary,
                expected_sample,
                actual_sample,
                check_number,
            }) => run.prefix_violations.push(PrefixViolation {
                key,
                boundary,
                expected_sample,
                actual_sample,
                check_number,
            }),
            Err(e) => warn!(npc_id, error = %e, "prefix audit failed"),
        }
    }

    fn record_cache_stats(&self, npc_id: &str, prompt: &CachedPrompt, response: &CompletionResponse) {
        if !self.config.kv_cache.track_metrics {
            return;
        }
        let mut stats = self.cache_stats.entry(npc_id.to_string()).or_default();
        stats.requests += 1;
        stats.static_tokens += prompt.estimated_static_tokens as u64;
        stats.prompt_tokens += u64::from(response.prompt_token_count);
        stats.cached_tokens += u64::from(response.cached_token_count);
    }

    /// Apply the side effects of a validated response.
    fn commit(
        &self,
        request: &DialogueRequest,
        store: &MemoryStore,
        response: &str,
        parsed: ParsedOutput,
        run: &mut Run,
    ) {
        for note in &parsed.memories {
            match store.add_episodic_memory(
                note.clone(),
                VALIDATED_MEMORY_SIGNIFICANCE,
                VALIDATED_MEMORY_CATEGORY,
                MutationSource::ValidatedOutput,
            ) {
                Ok(result) if result.success => run.stored_memories += 1,
                Ok(result) => debug!(npc_id = %request.npc_id(), reason = ?result.failure, "memory note rejected"),
                Err(e) => warn!(npc_id = %request.npc_id(), error = %e, "invalid memory note"),
            }
        }

        if !parsed.intents.is_empty() {
            if let Some(sink) = &self.intent_sink {
                sink.emit(request.npc_id(), &parsed.intents);
            }
            run.intents = parsed.intents;
        }

        let npc_label = request
            .npc_name
            .clone()
            .unwrap_or_else(|| self.config.prompt.default_npc_name.clone());
        let mut history = self.histories.entry(request.npc_id().to_string()).or_default();
        history.push(DialogueTurn::new(
            self.config.prompt.player_label.clone(),
            request.player_input(),
        ));
        history.push(DialogueTurn::new(npc_label, response));
        let keep = self.config.working_memory.max_dialogue_turns;
        if history.len() > keep {
            let excess = history.len() - keep;
            history.drain(..excess);
        }
    }
}

/// Accumulates the outcome of one `send_message` call.
struct Run {
    npc_id: String,
    attempts: Vec<InferenceResult>,
    intents: Vec<WorldIntent>,
    stored_memories: usize,
    prefix_violations: Vec<PrefixViolation>,
}

impl Run {
    fn new(npc_id: &str) -> Self {
        Self {
            npc_id: npc_id.to_string(),
            attempts: Vec::new(),
            intents: Vec::new(),
            stored_memories: 0,
            prefix_violations: Vec::new(),
        }
    }

    fn finish(self, status: PipelineStatus, response: String, reason: Option<FailureReason>, started: Instant) -> PipelineResult {
        let elapsed_ms = millis(started);
        debug!(npc_id = %self.npc_id, ?status, attempts = self.attempts.len(), elapsed_ms, "dialogue request finished");
        PipelineResult {
            status,
            response,
            attempts: self.attempts,
            failure_reason: reason,
            intents: self.intents,
            stored_memories: self.stored_memories,
            prefix_violations: self.prefix_violations,
            elapsed_ms,
        }
    }

    fn succeed(self, response: String, started: Instant) -> PipelineResult {
        self.finish(PipelineStatus::Success, response, None, started)
    }

    fn cancelled(self, started: Instant) -> PipelineResult {
        self.finish(PipelineStatus::Cancelled, String::new(), None, started)
    }

    fn fail(
        self,
        fallback: &dyn FallbackProvider,
        snapshot: Option<&InteractionSnapshot>,
        reason: FailureReason,
        started: Instant,
    ) -> PipelineResult {
        let line = fallback.fallback_response(snapshot, reason, self.attempts.last());
        self.finish(PipelineStatus::Failed, line, Some(reason), started)
    }
}

fn remaining_ms(remaining: Duration) -> u64 {
    u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX)
}

fn millis(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_npc_id_is_rejected() {
        assert!(DialogueRequest::new("  ", "hello").is_err());
        let request = DialogueRequest::new("smith", "hello").expect("valid");
        assert_eq!(request.npc_id(), "smith");
        assert_eq!(request.player_input(), "hello");
    }

    #[test]
    fn llama_server_pipeline_reads_llm_settings() {
        let mut config = LorekeeperConfig::default();
        config.llm.base_url = "http://127.0.0.1:8080/".into();
        assert!(DialoguePipeline::with_llama_server(config.clone()).is_ok());

        config.llm.request_timeout_ms = 0;
        assert!(matches!(
            DialoguePipeline::with_llama_server(config),
            Err(LoreError::Config(_))
        ));
    }

    #[test]
    fn cache_hit_ratio_handles_zero() {
        assert!((CacheStats::default().hit_ratio() - 0.0).abs() < f64::EPSILON);
        let stats = CacheStats {
            requests: 2,
            static_tokens: 40,
            prompt_tokens: 100,
            cached_tokens: 75,
        };
        assert!((stats.hit_ratio() - 0.75).abs() < 1e-9);
    }
}
