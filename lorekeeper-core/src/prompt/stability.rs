//! Prefix stability auditing.
//!
//! A cached prefix is only useful if it is byte-identical across requests.
//! [`PrefixStabilityValidator`] remembers the last prefix seen per key
//! (usually the NPC id) and reports when it changes while the boundary
//! stays the same. A boundary change re-baselines the key instead.
//!
//! Keys are independent: each lives in its own `DashMap` shard entry, and
//! the global counters are atomics updated while that entry is held.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{CacheBoundary, CachedPrompt};
use crate::error::{LoreError, Result};

/// Characters kept in each diagnostic sample.
const SAMPLE_CHARS: usize = 100;
/// Characters of shared context shown before the first difference.
const SAMPLE_LEAD: usize = 20;

/// A detected prefix change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixViolation {
    /// Key the prefix was tracked under.
    pub key: String,
    /// Boundary in effect for both observations.
    pub boundary: CacheBoundary,
    /// Baseline text around the first difference.
    pub expected_sample: String,
    /// New text around the first difference.
    pub actual_sample: String,
    /// Per-key observation counter when the change was seen.
    pub check_number: u64,
}

impl From<PrefixViolation> for LoreError {
    fn from(v: PrefixViolation) -> Self {
        Self::PrefixInstability {
            key: v.key,
            boundary: v.boundary,
            expected_sample: v.expected_sample,
            actual_sample: v.actual_sample,
            check_number: v.check_number,
        }
    }
}

#[derive(Debug)]
struct Baseline {
    prefix: String,
    boundary: CacheBoundary,
    checks: u64,
}

/// Tracks static prefixes per key and flags unexpected changes.
#[derive(Debug, Default)]
pub struct PrefixStabilityValidator {
    baselines: DashMap<String, Baseline>,
    violation_count: AtomicU64,
    check_count: AtomicU64,
    history: Mutex<Vec<PrefixViolation>>,
    throw_on_violation: bool,
}

impl PrefixStabilityValidator {
    /// Validator that returns violations as values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator that returns violations as [`LoreError::PrefixInstability`].
    #[must_use]
    pub fn throwing() -> Self {
        Self {
            throw_on_violation: true,
            ..Self::default()
        }
    }

    /// Compare `prefix` with the stored baseline for `key`.
    ///
    /// The first observation for a key, an identical prefix, and a boundary
    /// change all return `Ok(None)`; only a changed prefix under the same
    /// boundary is a violation.
    ///
    /// # Errors
    /// Returns [`LoreError::PrefixInstability`] for a violation when built
    /// with [`PrefixStabilityValidator::throwing`].
    pub fn validate(&self, key: &str, prefix: &str, boundary: CacheBoundary) -> Result<Option<PrefixViolation>> {
        self.check_count.fetch_add(1, Ordering::Relaxed);

        let violation = {
            let mut entry = self.baselines.entry(key.to_string()).or_insert_with(|| Baseline {
                prefix: prefix.to_string(),
                boundary,
                checks: 0,
            });
            let baseline = entry.value_mut();
            baseline.checks += 1;

            if baseline.boundary != boundary {
                baseline.prefix = prefix.to_string();
                baseline.boundary = boundary;
                None
            } else if baseline.prefix == prefix {
                None
            } else {
                let (expected_sample, actual_sample) = samples(&baseline.prefix, prefix);
                let violation = PrefixViolation {
                    key: key.to_string(),
                    boundary,
                    expected_sample,
                    actual_sample,
                    check_number: baseline.checks,
                };
                // Later checks compare against the newest prefix.
                baseline.prefix = prefix.to_string();
                self.violation_count.fetch_add(1, Ordering::Relaxed);
                Some(violation)
            }
        };

        let Some(violation) = violation else {
            return Ok(None);
        };
        warn!(
            key = %violation.key,
            boundary = %violation.boundary,
            check = violation.check_number,
            "static prompt prefix changed"
        );
        self.history.lock().push(violation.clone());
        if self.throw_on_violation {
            return Err(violation.into());
        }
        Ok(Some(violation))
    }

    /// [`Self::validate`] for an assembled split prompt. Prompts with
    /// caching disabled are ignored.
    ///
    /// # Errors
    /// As for [`Self::validate`].
    pub fn validate_prompt(&self, key: &str, prompt: &CachedPrompt) -> Result<Option<PrefixViolation>> {
        if !prompt.caching_enabled {
            return Ok(None);
        }
        self.validate(key, &prompt.static_prefix, prompt.boundary)
    }

    /// Violations seen across all keys since the last reset.
    #[must_use]
    pub fn violation_count(&self) -> u64 {
        self.violation_count.load(Ordering::Relaxed)
    }

    /// Whether any violation has been seen.
    #[must_use]
    pub fn has_violations(&self) -> bool {
        self.violation_count() > 0
    }

    /// Total checks across all keys since the last reset.
    #[must_use]
    pub fn check_count(&self) -> u64 {
        self.check_count.load(Ordering::Relaxed)
    }

    /// Number of keys with a baseline.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.baselines.len()
    }

    /// Recorded violations, oldest first.
    #[must_use]
    pub fn violations(&self) -> Vec<PrefixViolation> {
        self.history.lock().clone()
    }

    /// Forget the baseline for one key. Counters are kept.
    pub fn reset_key(&self, key: &str) {
        self.baselines.remove(key);
    }

    /// Clear every baseline, counter, and recorded violation.
    pub fn reset(&self) {
        self.baselines.clear();
        self.history.lock().clear();
        self.violation_count.store(0, Ordering::Relaxed);
        self.check_count.store(0, Ordering::Relaxed);
    }
}

/// Windows of both strings starting a little before their first difference.
fn samples(expected: &str, actual: &str) -> (String, String) {
    let first_diff = expected
        .chars()
        .zip(actual.chars())
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| expected.chars().count().min(actual.chars().count()));
    let start = first_diff.saturating_sub(SAMPLE_LEAD);
    let window = |s: &str| s.chars().skip(start).take(SAMPLE_CHARS).collect::<String>();
    (window(expected), window(actual))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    const B: CacheBoundary = CacheBoundary::AfterCanonicalFacts;

    #[test]
    fn first_and_identical_observations_pass() {
        let v = PrefixStabilityValidator::new();
        assert!(v.validate("npc", "System: hi", B).expect("ok").is_none());
        assert!(v.validate("npc", "System: hi", B).expect("ok").is_none());
        assert!(!v.has_violations());
        assert_eq!(v.tracked_keys(), 1);
    }

    #[test]
    fn changed_prefix_at_same_boundary_violates() {
        let v = PrefixStabilityValidator::new();
        v.validate("npc", "System: hi", B).expect("ok");
        let violation = v.validate("npc", "System: ho", B).expect("ok").expect("violation");
        assert_eq!(violation.key, "npc");
        assert_eq!(violation.check_number, 2);
        assert_eq!(violation.expected_sample, "System: hi");
        assert_eq!(violation.actual_sample, "System: ho");
        assert_eq!(v.violation_count(), 1);
        assert_eq!(v.violations().len(), 1);
    }

    #[test]
    fn boundary_change_rebaselines() {
        let v = PrefixStabilityValidator::new();
        v.validate("npc", "System: hi", B).expect("ok");
        assert!(v
            .validate("npc", "something else", CacheBoundary::AfterWorldState)
            .expect("ok")
            .is_none());
        assert!(v
            .validate("npc", "something else", CacheBoundary::AfterWorldState)
            .expect("ok")
            .is_none());
        assert!(!v.has_violations());
    }

    #[test]
    fn samples_are_short_previews() {
        let v = PrefixStabilityValidator::new();
        let base = "x".repeat(500);
        let changed = format!("{}y{}", "x".repeat(300), "x".repeat(199));
        v.validate("npc", &base, B).expect("ok");
        let violation = v.validate("npc", &changed, B).expect("ok").expect("violation");
        assert!(violation.expected_sample.chars().count() <= SAMPLE_CHARS);
        assert!(violation.actual_sample.contains('y'));
    }

    #[test]
    fn throwing_mode_returns_error() {
        let v = PrefixStabilityValidator::throwing();
        v.validate("npc", "a", B).expect("baseline");
        let err = v.validate("npc", "b", B).expect_err("instability");
        assert!(matches!(err, LoreError::PrefixInstability { check_number: 2, .. }));
        assert!(v.has_violations());
    }

    #[test]
    fn reset_clears_everything() {
        let v = PrefixStabilityValidator::new();
        v.validate("npc", "a", B).expect("ok");
        v.validate("npc", "b", B).expect("ok");
        v.reset();
        assert_eq!(v.violation_count(), 0);
        assert_eq!(v.tracked_keys(), 0);
        assert!(v.validate("npc", "c", B).expect("ok").is_none());
    }

    #[test]
    fn concurrent_keys_do_not_interfere() {
        let v = Arc::new(PrefixStabilityValidator::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let v = Arc::clone(&v);
                thread::spawn(move || {
                    let key = format!("npc-{i}");
                    for j in 0..50 {
                        // Odd threads change their prefix on every call.
                        let prefix = if i % 2 == 0 {
                            format!("stable {i}")
                        } else {
                            format!("changing {i} {j}")
                        };
                        v.validate(&key, &prefix, B).expect("ok");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread");
        }
        assert_eq!(v.tracked_keys(), 8);
        assert_eq!(v.check_count(), 400);
        // Four changing keys, 49 violations each.
        assert_eq!(v.violation_count(), 4 * 49);
    }
}
