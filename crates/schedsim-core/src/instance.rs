//! Simulated serving instance: compute slots, wait queue, KV cache.

use crate::kv_cache::TieredKvCache;
use crate::queue::WaitQueue;
use crate::request::Request;
use schedsim_policies::InstanceSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Compute throughput model for one instance.
///
/// Prefill is compute-bound and modeled as a bulk rate; decode is modeled as
/// a fixed inter-token interval per request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComputeModel {
    pub prefill_tokens_per_sec: f64,
    pub decode_tokens_per_sec: f64,
}

impl ComputeModel {
    /// Ticks to prefill `tokens` prompt tokens.
    pub fn prefill_ticks(&self, tokens: u32) -> u64 {
        (tokens as f64 / self.prefill_tokens_per_sec * 1e6).ceil() as u64
    }

    /// Ticks between consecutive generated tokens.
    pub fn decode_interval_ticks(&self) -> u64 {
        (1e6 / self.decode_tokens_per_sec).ceil().max(1.0) as u64
    }
}

/// One simulated serving node. Owns its wait queue, its cache, and the set
/// of requests currently holding a compute slot.
pub struct Instance {
    pub id: u32,
    /// Compute slots: how many requests can decode concurrently.
    pub max_running: u32,
    pub compute: ComputeModel,
    pub wait_queue: WaitQueue,
    pub kv_cache: TieredKvCache,
    pub running: HashMap<u64, Request>,
    /// True while a `SchedulingTick` is already in the event queue, so an
    /// instance never has two pending ticks.
    pub tick_pending: bool,
    pub total_completed: u64,
    pub total_tokens_generated: u64,
}

impl Instance {
    pub fn new(id: u32, max_running: u32, compute: ComputeModel, kv_cache: TieredKvCache) -> Self {
        Self {
            id,
            max_running,
            compute,
            wait_queue: WaitQueue::new(),
            kv_cache,
            running: HashMap::new(),
            tick_pending: false,
            total_completed: 0,
            total_tokens_generated: 0,
        }
    }

    pub fn has_free_slot(&self) -> bool {
        (self.running.len() as u32) < self.max_running
    }

    /// Build the read-only view scorers are given.
    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            id: self.id,
            queue_depth: self.wait_queue.len() as u32,
            running: self.running.len() as u32,
            max_running: self.max_running,
            hot_prefixes: self.kv_cache.hot_prefix_hashes(),
            cold_prefixes: self.kv_cache.cold_prefix_hashes(),
            hot_utilization: self.kv_cache.hot_utilization(),
        }
    }
}
