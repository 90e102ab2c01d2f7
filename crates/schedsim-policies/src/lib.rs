//! Built-in priority scorers for schedsim.
//!
//! This crate provides the [`PriorityScorer`] trait and several built-in
//! implementations for LLM inference admission control:
//!
//! | Scorer | Strategy | Best For |
//! |--------|----------|----------|
//! | [`Fcfs`] | Pure arrival order | Baselines, fairness studies |
//! | [`SloWeighted`] | Class weight + waiting age | Mixed interactive/batch traffic |
//! | [`PrefixAffinity`] | SLO blend + cache-residency bonus | Shared system prompts |

pub mod fcfs;
pub mod prefix_affinity;
pub mod slo_weighted;
pub mod traits;

pub use fcfs::Fcfs;
pub use prefix_affinity::PrefixAffinity;
pub use slo_weighted::SloWeighted;
pub use traits::*;

/// Create a scorer by name.
pub fn scorer_by_name(name: &str) -> Option<Box<dyn PriorityScorer>> {
    match name {
        "fcfs" => Some(Box::new(Fcfs::new())),
        "slo-weighted" => Some(Box::new(SloWeighted::new())),
        "prefix-affinity" => Some(Box::new(PrefixAffinity::new())),
        _ => None,
    }
}

/// List all available built-in scorer names.
pub fn available_scorers() -> Vec<&'static str> {
    vec!["fcfs", "slo-weighted", "prefix-affinity"]
}
