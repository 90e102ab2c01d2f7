//! First-come-first-served scoring.

use crate::traits::*;

/// Constant scorer. Every request gets the same score, so selection falls
/// through to the wait queue's position tie-break and requests are admitted
/// strictly in insertion order.
pub struct Fcfs;

impl Fcfs {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Fcfs {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityScorer for Fcfs {
    fn score(&self, _request: &RequestInfo, _state: &InstanceSnapshot, _clock: &dyn Clock) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "fcfs"
    }
}
