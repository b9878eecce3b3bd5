//! Retry-loop tests against a scripted model client.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use lorekeeper_core::{
    Constraint, ConstraintSet, LorekeeperConfig, MemoryStore, MutationSource, ValidationOutcome,
};
use lorekeeper_llm::{CompletionRequest, CompletionResponse, LlmError, ModelClient};
use lorekeeper_npc::{
    CollectingIntentSink, DialoguePipeline, DialogueRequest, FailureReason, PipelineStatus,
    StaticFallback,
};

/// Replies from a queue and records every prompt it was sent.
#[derive(Default)]
struct ScriptedClient {
    replies: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<CompletionResponse, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn texts(texts: &[&str]) -> Arc<Self> {
        Self::new(texts.iter().map(|t| Ok(CompletionResponse::text(*t))).collect())
    }

    fn prompts(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.prompt.clone()).collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Unavailable("script exhausted".into())))
    }
}

/// Never answers.
struct StalledClient;

#[async_trait]
impl ModelClient for StalledClient {
    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        std::future::pending().await
    }
}

fn pipeline(client: Arc<dyn ModelClient>) -> DialoguePipeline {
    DialoguePipeline::new(LorekeeperConfig::default(), client).expect("valid config")
}

fn no_secret() -> ConstraintSet {
    ConstraintSet::from(vec![Constraint::prohibition(
        "no-secret",
        "Never mention the secret",
        ["secret"],
    )])
}

fn spy_request(input: &str) -> DialogueRequest {
    DialogueRequest::new("spy", input)
        .expect("valid")
        .with_npc_name("Mira")
        .with_system_prompt("You are Mira, a tight-lipped spy.")
        .with_constraints(no_secret())
}

#[tokio::test]
async fn secret_is_escalated_and_second_answer_wins() {
    let client = ScriptedClient::texts(&["I know a secret", "Nothing to add"]);
    let pipeline = pipeline(client.clone());

    let result = pipeline.send_message(&spy_request("What do you know?")).await;

    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.attempt_count(), 2);
    assert_eq!(result.final_result().map(|r| r.response.as_str()), Some("Nothing to add"));
    assert_eq!(result.response, "Nothing to add");

    let first = &result.attempts[0];
    assert_eq!(first.validation.outcome, ValidationOutcome::ProhibitionViolated);
    let escalated = result.attempts[1].snapshot.constraints();
    assert!(escalated
        .iter()
        .any(|c| c.id.starts_with("retry-1-") && c.patterns.iter().any(|p| p.to_string() == "secret")));

    let prompts = client.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("[Retry 2 of 3]"));
    assert!(prompts[1].contains("Do NOT say \"secret\""));
    assert!(prompts[1].ends_with("Mira:"));
}

#[tokio::test]
async fn exhausted_attempts_use_fallback() {
    let client = ScriptedClient::texts(&["a secret", "the secret", "secret again"]);
    let pipeline = pipeline(client).with_fallback(Arc::new(StaticFallback::new("I have nothing to say.")));

    let result = pipeline.send_message(&spy_request("Tell me")).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert!(result.used_fallback());
    assert_eq!(result.attempt_count(), 3);
    assert_eq!(result.failure_reason, Some(FailureReason::RetriesExhausted));
    assert_eq!(result.response, "I have nothing to say.");
    assert!(pipeline.history("spy").is_empty());
}

#[tokio::test]
async fn collaborator_error_counts_as_failed_attempt() {
    let client = ScriptedClient::new(vec![
        Err(LlmError::Unavailable("connection refused".into())),
        Ok(CompletionResponse::text("Good evening.")),
    ]);
    let pipeline = pipeline(client.clone());

    let result = pipeline.send_message(&spy_request("Evening")).await;

    assert!(result.is_success());
    assert_eq!(result.attempt_count(), 2);
    let failed = &result.attempts[0];
    assert_eq!(failed.validation.outcome, ValidationOutcome::InvalidFormat);
    assert!(failed.collaborator_error.as_deref().is_some_and(|e| e.contains("connection refused")));
    assert!(client.prompts()[1].contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn cancellation_is_not_a_failure_and_writes_nothing() {
    let pipeline = pipeline(Arc::new(StalledClient));
    let store = pipeline.store("spy").expect("store");
    let before = store.stats();

    let result = pipeline
        .send_message_with_cancel(
            &spy_request("Hello?"),
            tokio::time::sleep(std::time::Duration::from_millis(20)),
        )
        .await;

    assert_eq!(result.status, PipelineStatus::Cancelled);
    assert_eq!(result.attempt_count(), 0);
    assert!(result.failure_reason.is_none());
    assert!(result.response.is_empty());
    assert_eq!(store.stats(), before);
    assert!(pipeline.history("spy").is_empty());
}

#[tokio::test]
async fn client_reported_cancel_stops_the_loop() {
    let client = ScriptedClient::new(vec![Err(LlmError::Cancelled)]);
    let result = pipeline(client.clone()).send_message(&spy_request("Hi")).await;
    assert_eq!(result.status, PipelineStatus::Cancelled);
    assert_eq!(client.prompts().len(), 1);
}

#[tokio::test]
async fn structured_output_stores_memories_and_emits_intents() {
    let json = r#"{"dialogue":"Take the key.","memories":["Gave the player the cellar key"],
        "intents":[{"type":"give_item","target":"player","parameters":{"item":"cellar_key"}}]}"#;
    let sink = Arc::new(CollectingIntentSink::new());
    let pipeline = pipeline(ScriptedClient::texts(&[json])).with_intent_sink(sink.clone());

    let result = pipeline
        .send_message(&DialogueRequest::new("innkeeper", "Can I see the cellar?").expect("valid"))
        .await;

    assert!(result.is_success());
    assert_eq!(result.response, "Take the key.");
    assert_eq!(result.stored_memories, 1);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].npc_id, "innkeeper");
    assert_eq!(events[0].intent.intent_type, "give_item");

    let memories = pipeline.store("innkeeper").expect("store").recent_memories(5);
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].source, MutationSource::ValidatedOutput);
}

#[tokio::test]
async fn rejected_structured_output_has_no_side_effects() {
    let json = r#"{"dialogue":"The secret is in the cellar.","memories":["Told the secret"],
        "intents":[{"type":"open_door","target":"cellar"}]}"#;
    let sink = Arc::new(CollectingIntentSink::new());
    let mut config = LorekeeperConfig::default();
    config.retry.max_retries = 0;
    let pipeline = DialoguePipeline::new(config, ScriptedClient::texts(&[json]))
        .expect("valid")
        .with_intent_sink(sink.clone());

    let result = pipeline.send_message(&spy_request("Where is it?")).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.attempt_count(), 1);
    assert!(sink.events().is_empty());
    assert!(result.intents.is_empty());
    assert!(pipeline.store("spy").expect("store").recent_memories(5).is_empty());
}

#[tokio::test(start_paused = true)]
async fn time_budget_stops_new_attempts() {
    let mut config = LorekeeperConfig::default();
    config.retry.retry_delay_ms = 50;
    config.retry.max_total_time_ms = 10;
    let client = ScriptedClient::texts(&["secret", "secret", "secret"]);
    let pipeline = DialoguePipeline::new(config, client.clone()).expect("valid");

    let result = pipeline.send_message(&spy_request("Well?")).await;

    assert_eq!(result.failure_reason, Some(FailureReason::TimeBudgetExceeded));
    assert_eq!(result.attempt_count(), 2);
    assert_eq!(client.prompts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn stalled_model_call_is_cut_off_by_time_budget() {
    let mut config = LorekeeperConfig::default();
    config.retry.max_total_time_ms = 100;
    let pipeline = DialoguePipeline::new(config, Arc::new(StalledClient))
        .expect("valid")
        .with_fallback(Arc::new(StaticFallback::new("Not now.")));

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(3600),
        pipeline.send_message(&spy_request("Anyone there?")),
    )
    .await
    .expect("pipeline returns within the time budget");

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.failure_reason, Some(FailureReason::TimeBudgetExceeded));
    assert_eq!(result.response, "Not now.");
    assert_eq!(result.attempt_count(), 1);
    assert!(result.attempts[0].collaborator_error.is_some());
    assert!(pipeline.history("spy").is_empty());
}

#[tokio::test]
async fn changing_topics_keep_the_cached_prefix() {
    let client = ScriptedClient::texts(&["Arthur rules.", "North, to the sea.", "Both are old."]);
    let pipeline = pipeline(client.clone());
    let store = Arc::new(MemoryStore::new("sage").expect("valid"));
    store.add_canonical_fact("king", "The king is Arthur", "lore").expect("valid");
    store.add_canonical_fact("river", "The river flows north", "geography").expect("valid");
    pipeline.register_store(store);

    for input in ["Who is the king?", "Where does the river go?", "king and river?"] {
        let request = DialogueRequest::new("sage", input)
            .expect("valid")
            .with_npc_name("Sage")
            .with_system_prompt("You are the village sage.");
        let result = pipeline.send_message(&request).await;
        assert!(result.is_success());
        assert!(result.prefix_violations.is_empty(), "{input} changed the prefix");
    }

    assert_eq!(pipeline.auditor().violation_count(), 0);
    for prompt in client.prompts() {
        assert!(prompt.contains("The king is Arthur"));
        assert!(prompt.contains("The river flows north"));
    }
}

#[tokio::test]
async fn history_keeps_only_recent_turns() {
    let replies: Vec<String> = (1..=5).map(|i| format!("Reply {i}")).collect();
    let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
    let mut config = LorekeeperConfig::default();
    config.working_memory.max_dialogue_turns = 4;
    let pipeline = DialoguePipeline::new(config, ScriptedClient::texts(&replies)).expect("valid");

    for i in 1..=5 {
        let request = DialogueRequest::new("clerk", format!("Question {i}")).expect("valid");
        assert!(pipeline.send_message(&request).await.is_success());
    }

    let history = pipeline.history("clerk");
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].text, "Question 4");
    assert_eq!(history[3].text, "Reply 5");
}

#[tokio::test]
async fn consecutive_turns_share_prefix_and_history() {
    let client = Arc::new(ScriptedClient {
        replies: Mutex::new(
            vec![
                Ok(CompletionResponse {
                    content: "Welcome.".into(),
                    prompt_token_count: 40,
                    generated_token_count: 2,
                    cached_token_count: 0,
                    timings: None,
                }),
                Ok(CompletionResponse {
                    content: "Safe travels.".into(),
                    prompt_token_count: 55,
                    generated_token_count: 3,
                    cached_token_count: 30,
                    timings: None,
                }),
            ]
            .into(),
        ),
        requests: Mutex::new(Vec::new()),
    });
    let pipeline = pipeline(client.clone());
    let store = Arc::new(MemoryStore::new("guard").expect("valid"));
    store
        .add_canonical_fact("gate", "The gate closes at dusk", "city")
        .expect("valid");
    pipeline.register_store(store);

    for input in ["Hello", "Goodbye"] {
        let request = DialogueRequest::new("guard", input)
            .expect("valid")
            .with_npc_name("Guard")
            .with_system_prompt("You guard the north gate.")
            .with_topics(["city"]);
        let result = pipeline.send_message(&request).await;
        assert!(result.is_success());
        assert!(result.prefix_violations.is_empty());
    }

    assert!(!pipeline.auditor().has_violations());
    let history = pipeline.history("guard");
    assert_eq!(history.len(), 4);
    assert_eq!(history[1].text, "Welcome.");
    assert!(client.prompts()[1].contains("Player: Hello"));
    assert!(client.requests.lock().iter().all(|r| r.cache_prompt));

    let stats = pipeline.cache_stats("guard").expect("tracked");
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.prompt_tokens, 95);
    assert_eq!(stats.cached_tokens, 30);
}

#[test]
fn blank_npc_is_a_programmer_error() {
    assert!(DialogueRequest::new("", "hi").is_err());
}
