//! Scorer behavior through the public API: class ordering, aging, cache
//! affinity, and the name registry.

use schedsim_policies::{
    available_scorers, scorer_by_name, Clock, InstanceSnapshot, RequestInfo, SloClass,
};
use std::collections::HashSet;

struct FixedClock(u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

fn request(id: u64, arrival: u64, slo: SloClass) -> RequestInfo {
    RequestInfo {
        id,
        arrival_time: arrival,
        slo,
        input_tokens: 256,
        remaining_output: 64,
        prefix_hash: None,
        prefix_tokens: 0,
        preemptions: 0,
    }
}

fn snapshot() -> InstanceSnapshot {
    InstanceSnapshot {
        id: 0,
        queue_depth: 2,
        running: 1,
        max_running: 4,
        hot_prefixes: HashSet::new(),
        cold_prefixes: HashSet::new(),
        hot_utilization: 0.25,
    }
}

#[test]
fn registry_knows_every_advertised_scorer() {
    for name in available_scorers() {
        let scorer = scorer_by_name(name).unwrap();
        assert_eq!(scorer.name(), name);
    }
    assert!(scorer_by_name("nonexistent").is_none());
}

#[test]
fn fcfs_scores_everything_equally() {
    let scorer = scorer_by_name("fcfs").unwrap();
    let clock = FixedClock(1_000_000);
    let a = scorer.score(&request(1, 0, SloClass::Batch), &snapshot(), &clock);
    let b = scorer.score(&request(2, 999_999, SloClass::Interactive), &snapshot(), &clock);
    assert_eq!(a, b);
}

#[test]
fn slo_weighted_prefers_interactive() {
    let scorer = scorer_by_name("slo-weighted").unwrap();
    let clock = FixedClock(100_000);
    let interactive = scorer.score(&request(1, 90_000, SloClass::Interactive), &snapshot(), &clock);
    let batch = scorer.score(&request(2, 0, SloClass::Batch), &snapshot(), &clock);
    assert!(interactive > batch);
}

#[test]
fn slo_weighted_ages_waiting_requests() {
    let scorer = scorer_by_name("slo-weighted").unwrap();
    let early = scorer.score(
        &request(1, 0, SloClass::Batch),
        &snapshot(),
        &FixedClock(1_000),
    );
    let late = scorer.score(
        &request(1, 0, SloClass::Batch),
        &snapshot(),
        &FixedClock(5_000_000),
    );
    assert!(late > early);

    // A batch request that has waited long enough eventually outranks a
    // fresh interactive one, so starvation is bounded.
    let clock = FixedClock(10_000_000_000);
    let stale_batch = scorer.score(&request(1, 0, SloClass::Batch), &snapshot(), &clock);
    let fresh_interactive = scorer.score(
        &request(2, 10_000_000_000, SloClass::Interactive),
        &snapshot(),
        &clock,
    );
    assert!(stale_batch > fresh_interactive);
}

#[test]
fn prefix_affinity_ranks_hot_over_cold_over_absent() {
    let scorer = scorer_by_name("prefix-affinity").unwrap();
    let clock = FixedClock(1_000);

    let mut state = snapshot();
    state.hot_prefixes.insert(0xAAA);
    state.cold_prefixes.insert(0xBBB);

    let with_prefix = |hash: u64| RequestInfo {
        prefix_hash: Some(hash),
        prefix_tokens: 128,
        ..request(1, 0, SloClass::Batch)
    };

    let hot = scorer.score(&with_prefix(0xAAA), &state, &clock);
    let cold = scorer.score(&with_prefix(0xBBB), &state, &clock);
    let absent = scorer.score(&with_prefix(0xCCC), &state, &clock);
    assert!(hot > cold);
    assert!(cold > absent);
}

#[test]
fn scores_are_pure_functions_of_their_inputs() {
    let clock = FixedClock(123_456);
    for name in available_scorers() {
        let scorer = scorer_by_name(name).unwrap();
        let req = request(7, 1_000, SloClass::Interactive);
        let state = snapshot();
        let first = scorer.score(&req, &state, &clock);
        for _ in 0..10 {
            assert_eq!(scorer.score(&req, &state, &clock), first);
        }
    }
}
