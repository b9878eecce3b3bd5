//! Model output parsing.
//!
//! A model may answer with plain dialogue or with a JSON object:
//!
//! ```json
//! {
//!   "dialogue": "Aye, the smithy is open.",
//!   "memories": ["The player asked about the smithy"],
//!   "intents": [{ "type": "open_shop", "target": "smithy", "parameters": { "discount": "0.1" } }]
//! }
//! ```
//!
//! Only the dialogue text is validated. Memories and intents are applied by
//! the pipeline once the attempt passes validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A world-affecting action requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldIntent {
    /// Action kind, e.g. `give_item`.
    #[serde(rename = "type")]
    pub intent_type: String,
    /// What the action applies to.
    #[serde(default)]
    pub target: String,
    /// Free-form string parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Parsed model output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    /// Text shown to the player and checked by the validator.
    pub dialogue: String,
    /// Memory notes to store on success.
    pub memories: Vec<String>,
    /// World intents to emit on success.
    pub intents: Vec<WorldIntent>,
    /// Whether the output was structured JSON.
    pub structured: bool,
}

#[derive(Deserialize)]
struct StructuredOutput {
    dialogue: String,
    #[serde(default)]
    memories: Vec<String>,
    #[serde(default)]
    intents: Vec<WorldIntent>,
}

/// Split raw model output into dialogue, memories, and intents.
///
/// Anything that is not a JSON object with a string `dialogue` field is
/// treated as plain dialogue. Blank memory notes and intents without a type
/// are dropped.
#[must_use]
pub fn parse_output(raw: &str) -> ParsedOutput {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str::<StructuredOutput>(trimmed) {
            return ParsedOutput {
                dialogue: parsed.dialogue.trim().to_string(),
                memories: parsed
                    .memories
                    .into_iter()
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect(),
                intents: parsed
                    .intents
                    .into_iter()
                    .filter(|i| !i.intent_type.trim().is_empty())
                    .collect(),
                structured: true,
            };
        }
    }
    ParsedOutput {
        dialogue: trimmed.to_string(),
        ..ParsedOutput::default()
    }
}
