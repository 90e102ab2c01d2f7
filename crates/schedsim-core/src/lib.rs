//! SchedSim — Discrete-event simulator for LLM inference scheduling.
//!
//! This crate provides the core simulation engine that models serving
//! instances, tiered KV caches, admission queues, and the interactions
//! between them. Priority scorers from `schedsim-policies` are plugged in
//! to drive admission and preemption decisions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────┐     ┌──────────────┐
//! │ Workload │────▶│  Engine   │────▶│   Metrics    │
//! │ Ingestion│     │ (Events)  │     │  Collection  │
//! └──────────┘     └─────┬─────┘     └──────────────┘
//!                        │
//!                ┌───────┴───────┐
//!                │    Scorer     │
//!                │  (Priority)   │
//!                └───────┬───────┘
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │ Instance │  │ Instance │  │ Instance │
//!    │ Hot/Cold │  │ Hot/Cold │  │ Hot/Cold │
//!    │  Queue   │  │  Queue   │  │  Queue   │
//!    └──────────┘  └──────────┘  └──────────┘
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod event;
pub mod instance;
pub mod kv_cache;
pub mod metrics;
pub mod queue;
pub mod request;
pub mod trace;

// Re-export key types for convenience.
pub use clock::SimClock;
pub use config::SimConfig;
pub use engine::SimulationEngine;
pub use event::{EventQueue, SimEvent};
pub use instance::{ComputeModel, Instance};
pub use kv_cache::{Tier, TieredKvCache};
pub use metrics::{MetricsCollector, SimulationReport};
pub use queue::WaitQueue;
pub use request::{Request, RequestState};
pub use trace::{generate_synthetic, load_trace, write_compact_jsonl};

/// Run a complete simulation with the given config, workload, and scorer.
pub fn run_simulation(
    config: &SimConfig,
    requests: Vec<Request>,
    scorer: Box<dyn schedsim_policies::PriorityScorer>,
) -> SimulationReport {
    let mut engine = SimulationEngine::new(config, scorer);
    engine.load_workload(requests);
    engine.run()
}

/// Run a comparison of multiple scorers on the same workload and config.
pub fn compare_scorers(
    config: &SimConfig,
    requests: &[Request],
    scorer_names: &[&str],
) -> Vec<SimulationReport> {
    scorer_names
        .iter()
        .filter_map(|name| {
            let scorer = schedsim_policies::scorer_by_name(name)?;
            Some(run_simulation(config, requests.to_vec(), scorer))
        })
        .collect()
}
