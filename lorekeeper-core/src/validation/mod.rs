//! Response validation against a [`ConstraintSet`].
//!
//! Outcome precedence, first match wins:
//!
//! 1. blank response → [`ValidationOutcome::InvalidFormat`]
//! 2. any prohibition matches → [`ValidationOutcome::ProhibitionViolated`]
//! 3. any patterned requirement unmatched → [`ValidationOutcome::RequirementNotMet`]
//! 4. otherwise → [`ValidationOutcome::Valid`]
//!
//! Validation is pure and never fails; broken regexes are skipped.

pub mod constraint;
pub mod retry;

pub use constraint::{Constraint, ConstraintKind, ConstraintSet, Pattern};
pub use retry::{EscalationMode, RetryPolicy};

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Overall verdict on a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// Every constraint is satisfied.
    Valid,
    /// The response is empty, unparseable, or the model call failed.
    InvalidFormat,
    /// At least one prohibition matched.
    ProhibitionViolated,
    /// At least one requirement with patterns was not matched.
    RequirementNotMet,
}

/// One broken constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// The constraint that was broken.
    pub constraint: Constraint,
    /// What went wrong, for feedback text.
    pub description: String,
    /// The offending text (prohibitions only), at most 50 characters.
    pub violating_text_sample: Option<String>,
}

/// Verdict plus itemized violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Overall verdict.
    pub outcome: ValidationOutcome,
    /// Every violation of the winning category.
    pub violations: Vec<Violation>,
    /// Summary for logs, absent when valid.
    pub error_message: Option<String>,
    /// The text that was checked.
    pub response: String,
}

impl ValidationResult {
    /// Whether the response passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.outcome == ValidationOutcome::Valid
    }

    /// A failed result for text that could not be obtained or parsed.
    #[must_use]
    pub fn invalid_format(response: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            outcome: ValidationOutcome::InvalidFormat,
            violations: Vec::new(),
            error_message: Some(message.into()),
            response: response.into(),
        }
    }
}

/// Check `response` against every constraint.
#[must_use]
pub fn validate(response: &str, constraints: &ConstraintSet) -> ValidationResult {
    if response.trim().is_empty() {
        return ValidationResult::invalid_format(response, "Response is empty");
    }

    let prohibited: Vec<Violation> = constraints
        .prohibitions()
        .filter_map(|c| {
            let sample = c.effective_patterns().iter().find_map(|p| p.find(response))?;
            trace!(constraint = %c.id, sample = %sample, "prohibition matched");
            Some(Violation {
                constraint: c.clone(),
                description: format!("Prohibited content: {}", c.description),
                violating_text_sample: Some(sample),
            })
        })
        .collect();
    if !prohibited.is_empty() {
        return failed(response, ValidationOutcome::ProhibitionViolated, prohibited);
    }

    let unmet: Vec<Violation> = constraints
        .requirements()
        .filter(|c| !c.patterns.is_empty() && !c.patterns.iter().any(|p| p.is_match(response)))
        .map(|c| Violation {
            constraint: c.clone(),
            description: format!("Missing requirement: {}", c.description),
            violating_text_sample: None,
        })
        .collect();
    if !unmet.is_empty() {
        return failed(response, ValidationOutcome::RequirementNotMet, unmet);
    }

    ValidationResult {
        outcome: ValidationOutcome::Valid,
        violations: Vec::new(),
        error_message: None,
        response: response.to_string(),
    }
}

fn failed(response: &str, outcome: ValidationOutcome, violations: Vec<Violation>) -> ValidationResult {
    let ids: Vec<&str> = violations.iter().map(|v| v.constraint.id.as_str()).collect();
    let label = match outcome {
        ValidationOutcome::ProhibitionViolated => "prohibition(s) violated",
        _ => "requirement(s) not met",
    };
    let error_message = format!("{} {label}: {}", violations.len(), ids.join(", "));
    ValidationResult {
        outcome,
        violations,
        error_message: Some(error_message),
        response: response.to_string(),
    }
}
