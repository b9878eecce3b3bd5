//! # lorekeeper-llm — model-call collaborator
//!
//! The dialogue pipeline treats the model as an opaque async function from
//! prompt to text. This crate defines that contract ([`ModelClient`]) and
//! one backend for it, [`LlamaServerClient`], which talks to a llama.cpp
//! style `/completion` endpoint and forwards the prompt-cache hints
//! (`cache_prompt`, `n_keep`) produced by the prompt assembler.
//!
//! ```text
//! CompletionRequest { prompt, max_tokens?, temperature?, seed?, cache_prompt, n_keep? }
//!        │
//!        ▼
//! ModelClient::complete ──► CompletionResponse { content, token counts, timings }
//! ```

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod types;

pub use client::{LlamaServerClient, ModelClient};
pub use error::LlmError;
pub use types::{CompletionRequest, CompletionResponse, CompletionTimings};
