//! Episodic decay model.
//!
//! Each decay tick scales a memory's significance by `(1 - rate)`:
//!
//!   S(n+1) = max(0, S(n) · (1 − rate))
//!
//! The curve is monotonic and never negative. Decay only weakens memories;
//! removal is left to retrieval thresholds and the store's capacity limit.

use crate::memory::episodic::EpisodicMemory;

/// Significance after one tick at `rate` (clamped to `[0, 1]`).
#[must_use]
pub fn decayed(significance: f32, rate: f32) -> f32 {
    let rate = rate.clamp(0.0, 1.0);
    (significance * (1.0 - rate)).clamp(0.0, 1.0)
}

/// Apply one decay tick in place. Returns how many memories lost strength.
pub fn apply_tick(memories: &mut [EpisodicMemory], rate: f32) -> usize {
    let mut changed = 0;
    for memory in memories.iter_mut() {
        let next = decayed(memory.significance, rate);
        if next < memory.significance {
            changed += 1;
        }
        memory.significance = next;
    }
    changed
}

/// Number of ticks until a memory starting at `significance` drops below
/// `threshold`, or `None` if it never will (zero rate or zero threshold).
#[must_use]
pub fn ticks_until_below(significance: f32, threshold: f32, rate: f32) -> Option<u32> {
    if significance < threshold {
        return Some(0);
    }
    if rate <= 0.0 || threshold <= 0.0 {
        return None;
    }
    let mut current = significance;
    let mut ticks = 0_u32;
    while current >= threshold {
        current = decayed(current, rate);
        ticks = ticks.checked_add(1)?;
    }
    Some(ticks)
}
