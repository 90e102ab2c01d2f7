//! Priority scorer trait definitions.
//!
//! All scorers implement the [`PriorityScorer`] trait, which receives request
//! information and an instance snapshot and returns a priority score. Scorers
//! are pure: `score` takes `&self` and must return the same value for the same
//! inputs. The engine re-scores the whole wait queue on every scheduling tick,
//! so nothing here may cache scores across ticks.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Service-level class of a request. Interactive traffic is latency-bound,
/// batch traffic is throughput-bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SloClass {
    Interactive,
    Batch,
}

impl SloClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SloClass::Interactive => "interactive",
            SloClass::Batch => "batch",
        }
    }
}

/// Virtual simulation clock interface for scorers.
pub trait Clock {
    /// Current virtual time in ticks.
    fn now(&self) -> u64;
}

/// Information about a queued request, provided to scorers.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub id: u64,
    pub arrival_time: u64,
    pub slo: SloClass,
    pub input_tokens: u32,
    pub remaining_output: u32,
    pub prefix_hash: Option<u64>,
    pub prefix_tokens: u32,
    /// How many times this request has already been preempted.
    pub preemptions: u32,
}

/// Read-only snapshot of a serving instance's state, rebuilt before every
/// scheduling tick.
///
/// This is the policies crate's view of an instance — it contains only the
/// information needed for scoring decisions, not the full simulation state.
#[derive(Debug, Clone)]
pub struct InstanceSnapshot {
    pub id: u32,
    pub queue_depth: u32,
    pub running: u32,
    pub max_running: u32,
    /// Prefix hashes currently resident in the hot tier.
    pub hot_prefixes: HashSet<u64>,
    /// Prefix hashes parked in the cold tier.
    pub cold_prefixes: HashSet<u64>,
    /// Hot-tier block occupancy in [0.0, 1.0].
    pub hot_utilization: f32,
}

impl InstanceSnapshot {
    pub fn has_free_slot(&self) -> bool {
        self.running < self.max_running
    }
}

/// The core scoring trait.
///
/// Implement this trait to create custom admission policies. Higher score
/// wins; the wait queue breaks ties by queue position, so a constant scorer
/// degenerates to FCFS.
pub trait PriorityScorer: Send + Sync {
    /// Score a queued request against the instance it is waiting on.
    fn score(&self, request: &RequestInfo, state: &InstanceSnapshot, clock: &dyn Clock) -> f64;

    /// Human-readable name for reports.
    fn name(&self) -> &str;
}
