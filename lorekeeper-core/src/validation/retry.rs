//! Retry policy: bounded attempts and constraint escalation.
//!
//! Everything here is a pure function of its inputs. The same violations
//! at the same attempt number always produce byte-identical constraints
//! and feedback.

use serde::{Deserialize, Serialize};

use crate::inference::InferenceResult;
use crate::types::preview;
use crate::validation::{Constraint, ConstraintKind, ConstraintSet, Pattern, Violation};

/// Characters of the previous response quoted in feedback.
const PREVIOUS_RESPONSE_CHARS: usize = 200;
/// Marker prefixed to hardened requirements.
const HARDENED_MARKER: &str = "IMPORTANT:";

/// How violations are turned into extra constraints for the next attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationMode {
    /// Retry with the original constraints only.
    None,
    /// Add a targeted prohibition per violation.
    AddSpecificProhibition,
    /// Re-state violated requirements more forcefully.
    HardenRequirements,
    /// Both of the above.
    #[default]
    Full,
}

/// Attempt bounds and escalation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Escalation strategy.
    pub escalation: EscalationMode,
    /// Quote the rejected response in feedback.
    pub include_previous_response: bool,
    /// List violation descriptions in feedback.
    pub include_violation_feedback: bool,
    /// Pause between attempts.
    pub retry_delay_ms: u64,
    /// Budget for the whole attempt loop.
    pub max_total_time_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            escalation: EscalationMode::Full,
            include_previous_response: true,
            include_violation_feedback: true,
            retry_delay_ms: 0,
            max_total_time_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            escalation: EscalationMode::None,
            ..Self::default()
        }
    }

    /// Total attempts allowed, first one included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt may follow attempt `attempt_number` (1-indexed).
    #[must_use]
    pub fn should_retry(&self, attempt_number: u32) -> bool {
        attempt_number < self.max_attempts()
    }

    /// Extra constraints for the attempt after `attempt_number`.
    #[must_use]
    pub fn generate_retry_constraints(&self, violations: &[Violation], attempt_number: u32) -> ConstraintSet {
        let prohibit = matches!(
            self.escalation,
            EscalationMode::AddSpecificProhibition | EscalationMode::Full
        );
        let harden = matches!(
            self.escalation,
            EscalationMode::HardenRequirements | EscalationMode::Full
        );

        let mut out = ConstraintSet::new();
        for violation in violations {
            let original = &violation.constraint;
            match original.kind {
                ConstraintKind::Prohibition => {
                    if prohibit {
                        out.push(specific_prohibition(violation, attempt_number));
                    }
                }
                ConstraintKind::Requirement => {
                    if self.escalation == EscalationMode::Full {
                        out.push(specific_prohibition(violation, attempt_number));
                    }
                    if harden {
                        out.push(hardened_requirement(original, attempt_number));
                    }
                }
            }
        }
        out
    }

    /// Feedback block placed in the next attempt's prompt.
    #[must_use]
    pub fn generate_retry_feedback(&self, result: &InferenceResult) -> String {
        let next = result.attempt_number.saturating_add(1);
        let mut text = format!(
            "[Retry {next} of {}] Your previous response was rejected.\n",
            self.max_attempts()
        );
        if self.include_previous_response && !result.response.trim().is_empty() {
            text.push_str(&format!(
                "Previous response: \"{}\"\n",
                preview(&result.response, PREVIOUS_RESPONSE_CHARS, "...")
            ));
        }
        if self.include_violation_feedback {
            let violations = &result.validation.violations;
            if violations.is_empty() {
                if let Some(message) = &result.validation.error_message {
                    text.push_str(&format!("Problem: {message}\n"));
                }
            } else {
                text.push_str("Problems:\n");
                for violation in violations {
                    text.push_str(&format!("- {}\n", violation.description));
                }
            }
        }
        text.push_str("Respond again in character and satisfy every constraint.\n");
        text
    }
}

fn specific_prohibition(violation: &Violation, attempt_number: u32) -> Constraint {
    let original = &violation.constraint;
    let patterns: Vec<Pattern> = violation
        .violating_text_sample
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| Pattern::literal(s.clone()))
        .collect();
    let injection = match &violation.violating_text_sample {
        Some(sample) => format!("Do NOT say \"{sample}\". {}", original.prompt_line()),
        None => format!("Do NOT ignore this rule: {}", original.prompt_line()),
    };
    Constraint {
        id: format!("retry-{attempt_number}-prohibit-{}", original.id),
        kind: ConstraintKind::Prohibition,
        description: original.description.clone(),
        prompt_injection_text: injection,
        patterns,
    }
}

fn hardened_requirement(original: &Constraint, attempt_number: u32) -> Constraint {
    Constraint {
        id: format!("retry-{attempt_number}-require-{}", original.id),
        kind: ConstraintKind::Requirement,
        description: format!("{HARDENED_MARKER} {}", original.description),
        prompt_injection_text: format!("{HARDENED_MARKER} You MUST {}", original.prompt_line()),
        patterns: original.patterns.clone(),
    }
}
