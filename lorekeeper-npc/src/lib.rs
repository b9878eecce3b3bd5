//! # lorekeeper-npc — dialogue orchestration
//!
//! Wires the core pipeline to a model client:
//!
//! ```text
//! DialogueRequest
//!   │  retrieve (MemoryStore → RetrievedContext)
//!   ▼
//! InteractionSnapshot ─► WorkingMemory ─► CachedPrompt (static prefix | dynamic suffix)
//!   │                                          │
//!   │                               ModelClient::complete
//!   ▼                                          ▼
//! validate ◄──────────────────────────── parse_output
//!   │ invalid: escalate + feedback, retry
//!   ▼ valid: store memories, emit intents
//! PipelineResult
//! ```
//!
//! ## Modules
//!
//! - `pipeline`: the retry loop ([`DialoguePipeline`])
//! - `output`: plain-text or JSON model output
//! - `fallback`: lines used when every attempt fails
//! - `intents`: sinks for world intents from validated responses
//! - `telemetry`: tracing subscriber setup

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fallback;
pub mod intents;
pub mod output;
pub mod pipeline;
pub mod telemetry;

pub use fallback::{FailureReason, FallbackProvider, StaticFallback};
pub use intents::{ChannelIntentSink, CollectingIntentSink, IntentEvent, IntentSink};
pub use output::{ParsedOutput, WorldIntent, parse_output};
pub use pipeline::{CacheStats, DialoguePipeline, DialogueRequest, PipelineResult, PipelineStatus};
pub use telemetry::{init_tracing, init_tracing_from_config};
