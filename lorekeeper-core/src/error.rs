//! Error types for the lorekeeper core library.
//!
//! Only programmer errors and infrastructure faults live here. Expected
//! business outcomes (authority rejections, duplicate facts, failed
//! validation) are returned as typed results by the components themselves.

use thiserror::Error;

use crate::prompt::CacheBoundary;

/// Top-level error type for all lorekeeper core operations.
#[derive(Error, Debug)]
pub enum LoreError {
    /// A required argument was empty, out of range, or otherwise unusable.
    #[error("Invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Which argument was rejected.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The static prompt prefix changed for a key while the boundary stayed put.
    #[error(
        "Prefix instability for `{key}` at {boundary} (check #{check_number}): expected '{expected_sample}', got '{actual_sample}'"
    )]
    PrefixInstability {
        /// Key the prefix was tracked under (usually the NPC id).
        key: String,
        /// Boundary in effect for both observations.
        boundary: CacheBoundary,
        /// Preview of the stored baseline prefix.
        expected_sample: String,
        /// Preview of the newly observed prefix.
        actual_sample: String,
        /// Per-key check counter at the time of the violation.
        check_number: u64,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoreError {
    /// Shorthand for an [`LoreError::InvalidArgument`].
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, LoreError>;

/// Reject empty or whitespace-only required strings.
pub(crate) fn require_non_blank(name: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LoreError::invalid(name, "must not be empty"));
    }
    Ok(())
}

/// Reject NaN and infinities.
pub(crate) fn require_finite(name: &'static str, value: f32) -> Result<()> {
    if !value.is_finite() {
        return Err(LoreError::invalid(name, format!("must be finite, got {value}")));
    }
    Ok(())
}
