//! Tiered KV cache simulation with prefix reuse, LRU eviction, and
//! hot/cold demotion.
//!
//! Models the memory management of a paged KV cache backed by a slower
//! offload tier:
//! - Block-counted allocation per request (private blocks) and per shared
//!   prefix (reference-counted entries)
//! - Hot tier: what the instance can compute against, bounded by `hot_blocks`
//! - Cold tier: demoted prefixes survive preemption here instead of being
//!   recomputed; promotion back costs a transfer delay
//! - LRU eviction of unreferenced hot entries, cache hit/miss tracking

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which tier a prefix lookup found its entry in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Hot,
    Cold,
}

/// A reference-counted prefix entry resident in one tier.
#[derive(Debug, Clone)]
struct PrefixEntry {
    blocks: u32,
    tokens: u32,
    /// Number of running requests currently computing against this prefix.
    ref_count: u32,
    last_used: u64,
    /// True while a cold-to-hot promotion is still in flight.
    in_transfer: bool,
}

/// What an admission got from the cache.
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    /// Prompt tokens that still need prefill computation.
    pub prefill_tokens: u32,
    /// Ticks until the prefix is usable (0 unless promoted from cold).
    pub transfer_ticks: u64,
    /// Which tier the prefix was found in, if any.
    pub prefix_hit: Option<Tier>,
}

/// Statistics snapshot for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvCacheStats {
    pub hot_blocks: u32,
    pub hot_used: u32,
    pub cold_blocks: u32,
    pub cold_used: u32,
    pub hot_utilization: f32,
    pub hot_prefix_entries: usize,
    pub cold_prefix_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub demotions: u64,
    pub promotions: u64,
}

/// Two-tier block-based KV cache for a single serving instance.
#[derive(Debug, Clone)]
pub struct TieredKvCache {
    hot_capacity: u32,
    cold_capacity: u32,
    block_size: u32,
    /// Transfer throughput between tiers, in tokens per tick.
    transfer_bandwidth: f64,
    /// Fixed per-transfer setup cost in ticks.
    transfer_base_latency: u64,
    hot: HashMap<u64, PrefixEntry>,
    cold: HashMap<u64, PrefixEntry>,
    hot_used: u32,
    cold_used: u32,
    /// Private (non-prefix) blocks held per running request.
    request_blocks: HashMap<u64, u32>,
    /// Prefix hash referenced per running request.
    request_prefix: HashMap<u64, u64>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub demotions: u64,
    pub promotions: u64,
}

impl TieredKvCache {
    pub fn new(
        hot_capacity: u32,
        cold_capacity: u32,
        block_size: u32,
        transfer_bandwidth: f64,
        transfer_base_latency: u64,
    ) -> Self {
        assert!(hot_capacity > 0, "hot tier must have at least one block");
        assert!(block_size > 0, "block size must be positive");
        assert!(transfer_bandwidth > 0.0, "transfer bandwidth must be positive");
        Self {
            hot_capacity,
            cold_capacity,
            block_size,
            transfer_bandwidth,
            transfer_base_latency,
            hot: HashMap::new(),
            cold: HashMap::new(),
            hot_used: 0,
            cold_used: 0,
            request_blocks: HashMap::new(),
            request_prefix: HashMap::new(),
            hits: 0,
            misses: 0,
            evictions: 0,
            demotions: 0,
            promotions: 0,
        }
    }

    pub fn hot_used(&self) -> u32 {
        self.hot_used
    }

    pub fn hot_utilization(&self) -> f32 {
        self.hot_used as f32 / self.hot_capacity as f32
    }

    /// Running hit rate over all prefix lookups so far.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    /// Cost in ticks of moving `tokens` between tiers.
    pub fn transfer_ticks(&self, tokens: u32) -> u64 {
        self.transfer_base_latency + (tokens as f64 / self.transfer_bandwidth).ceil() as u64
    }

    /// Which tier holds `prefix_hash`, without touching counters or LRU state.
    pub fn residency(&self, prefix_hash: u64) -> Option<Tier> {
        if self.hot.contains_key(&prefix_hash) {
            Some(Tier::Hot)
        } else if self.cold.contains_key(&prefix_hash) {
            Some(Tier::Cold)
        } else {
            None
        }
    }

    pub fn hot_prefix_hashes(&self) -> HashSet<u64> {
        self.hot.keys().copied().collect()
    }

    pub fn cold_prefix_hashes(&self) -> HashSet<u64> {
        self.cold.keys().copied().collect()
    }

    fn blocks_for_tokens(&self, tokens: u32) -> u32 {
        tokens.div_ceil(self.block_size)
    }

    /// Try to allocate everything a request needs to start running.
    ///
    /// Returns `None` without mutating anything when the hot tier cannot fit
    /// the request even after evicting every unreferenced entry — the caller
    /// treats that as ordinary capacity contention, not an error. On success
    /// the hit/miss counters reflect the prefix lookup.
    pub fn allocate_for_request(
        &mut self,
        request_id: u64,
        input_tokens: u32,
        output_tokens: u32,
        prefix_hash: Option<u64>,
        prefix_tokens: u32,
        now: u64,
    ) -> Option<AllocationOutcome> {
        let prefix = match prefix_hash {
            Some(hash) if prefix_tokens > 0 => Some(hash),
            _ => None,
        };
        let found = prefix.and_then(|hash| self.residency(hash));

        // Size the prefix reservation from the resident entry when the lookup
        // hits; a request's claimed prefix length may disagree with what was
        // actually cached, and promotion moves the entry's blocks as-is.
        let prefix_blocks = match (prefix, found) {
            (Some(hash), Some(Tier::Cold)) => self
                .cold
                .get(&hash)
                .map(|e| e.blocks)
                .unwrap_or_else(|| panic!("cold entry {hash:#x} vanished")),
            _ => self.blocks_for_tokens(prefix_tokens),
        };
        let private_tokens = match prefix {
            Some(_) => input_tokens.saturating_sub(prefix_tokens) + output_tokens,
            None => input_tokens + output_tokens,
        };
        let private_blocks = self.blocks_for_tokens(private_tokens);

        // Hot blocks this admission adds: private always, plus the prefix
        // entry unless it is already hot.
        let extra_hot = private_blocks
            + match (prefix, found) {
                (Some(_), Some(Tier::Hot)) => 0,
                (Some(_), _) => prefix_blocks,
                (None, _) => 0,
            };

        // Feasibility before any mutation, so a failed attempt leaves the
        // cache (and the hit/miss counters) untouched.
        let free = self.hot_capacity - self.hot_used;
        if extra_hot > free {
            let evictable: u32 = self
                .hot
                .iter()
                .filter(|(hash, e)| e.ref_count == 0 && !e.in_transfer && Some(**hash) != prefix)
                .map(|(_, e)| e.blocks)
                .sum();
            if extra_hot > free + evictable {
                return None;
            }
            self.evict_hot_until_free(extra_hot, prefix);
        }

        let (transfer_ticks, prefill_tokens) = match (prefix, found) {
            (Some(hash), Some(Tier::Hot)) => {
                self.hits += 1;
                let (entry_tokens, pending_transfer) = {
                    let entry = self
                        .hot
                        .get_mut(&hash)
                        .unwrap_or_else(|| panic!("hot entry {hash:#x} vanished"));
                    entry.ref_count += 1;
                    entry.last_used = now;
                    (entry.tokens, entry.in_transfer)
                };
                // A second requester during an in-flight promotion waits for
                // its own transfer-complete rather than tracking the first's.
                let ticks = if pending_transfer {
                    self.transfer_ticks(entry_tokens)
                } else {
                    0
                };
                (ticks, input_tokens.saturating_sub(prefix_tokens))
            }
            (Some(hash), Some(Tier::Cold)) => {
                self.hits += 1;
                self.promotions += 1;
                let mut entry = self
                    .cold
                    .remove(&hash)
                    .unwrap_or_else(|| panic!("cold entry {hash:#x} vanished"));
                self.cold_used -= entry.blocks;
                let ticks = self.transfer_ticks(entry.tokens);
                entry.ref_count += 1;
                entry.last_used = now;
                entry.in_transfer = true;
                self.hot_used += entry.blocks;
                self.hot.insert(hash, entry);
                (ticks, input_tokens.saturating_sub(prefix_tokens))
            }
            (Some(hash), None) => {
                self.misses += 1;
                self.hot.insert(
                    hash,
                    PrefixEntry {
                        blocks: prefix_blocks,
                        tokens: prefix_tokens,
                        ref_count: 1,
                        last_used: now,
                        in_transfer: false,
                    },
                );
                self.hot_used += prefix_blocks;
                (0, input_tokens)
            }
            (None, _) => (0, input_tokens),
        };

        self.hot_used += private_blocks;
        self.request_blocks.insert(request_id, private_blocks);
        if let Some(hash) = prefix {
            self.request_prefix.insert(request_id, hash);
        }
        assert!(
            self.hot_used <= self.hot_capacity,
            "hot tier over capacity: {}/{}",
            self.hot_used,
            self.hot_capacity,
        );

        Some(AllocationOutcome {
            prefill_tokens,
            transfer_ticks,
            prefix_hit: found,
        })
    }

    /// Release blocks held by a completed request.
    ///
    /// Private blocks are freed immediately; the prefix entry stays hot with
    /// a decremented ref count so later requests can reuse it (it becomes
    /// evictable at ref zero).
    pub fn release_request(&mut self, request_id: u64, now: u64) {
        if let Some(private) = self.request_blocks.remove(&request_id) {
            self.hot_used -= private;
        }
        if let Some(hash) = self.request_prefix.remove(&request_id) {
            if let Some(entry) = self.hot.get_mut(&hash) {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                entry.last_used = now;
            }
        }
    }

    /// Release a preempted request's blocks and demote its prefix to the
    /// cold tier instead of discarding the computed KV state.
    ///
    /// The entry moves only once no other running request references it; a
    /// shared prefix stays hot for the others. A cold tier too small for the
    /// entry drops it (counted as an eviction).
    pub fn demote_for_preemption(&mut self, request_id: u64, now: u64) {
        if let Some(private) = self.request_blocks.remove(&request_id) {
            self.hot_used -= private;
        }
        let hash = match self.request_prefix.remove(&request_id) {
            Some(h) => h,
            None => return,
        };
        let still_shared = match self.hot.get_mut(&hash) {
            Some(entry) => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                entry.ref_count > 0
            }
            None => return,
        };
        if still_shared {
            return;
        }
        if let Some(mut entry) = self.hot.remove(&hash) {
            self.hot_used -= entry.blocks;
            self.demotions += 1;
            if entry.blocks > self.cold_capacity {
                self.evictions += 1;
                return;
            }
            while self.cold_used + entry.blocks > self.cold_capacity {
                if !self.evict_one_cold() {
                    self.evictions += 1;
                    return;
                }
            }
            entry.last_used = now;
            entry.in_transfer = false;
            self.cold_used += entry.blocks;
            self.cold.insert(hash, entry);
        }
    }

    /// A cold-to-hot promotion finished; the entry is now computable.
    /// Idempotent — overlapping promotions of a shared prefix each schedule
    /// their own completion.
    pub fn mark_transfer_complete(&mut self, prefix_hash: u64) {
        if let Some(entry) = self.hot.get_mut(&prefix_hash) {
            entry.in_transfer = false;
        } else if let Some(entry) = self.cold.get_mut(&prefix_hash) {
            // Demoted again before the transfer landed.
            entry.in_transfer = false;
        }
    }

    /// Evict unreferenced hot entries, least recently used first, until
    /// `needed` blocks fit. Feasibility was checked by the caller.
    fn evict_hot_until_free(&mut self, needed: u32, exclude: Option<u64>) {
        while self.hot_capacity - self.hot_used < needed {
            let victim = self
                .hot
                .iter()
                .filter(|(hash, e)| e.ref_count == 0 && !e.in_transfer && Some(**hash) != exclude)
                .min_by_key(|(hash, e)| (e.last_used, **hash))
                .map(|(hash, _)| *hash);
            match victim {
                Some(hash) => {
                    if let Some(entry) = self.hot.remove(&hash) {
                        self.hot_used -= entry.blocks;
                        self.evictions += 1;
                    }
                }
                None => panic!(
                    "hot tier eviction underflow: need {} blocks, used {}/{}",
                    needed, self.hot_used, self.hot_capacity,
                ),
            }
        }
    }

    fn evict_one_cold(&mut self) -> bool {
        let victim = self
            .cold
            .iter()
            .min_by_key(|(hash, e)| (e.last_used, **hash))
            .map(|(hash, _)| *hash);
        match victim {
            Some(hash) => {
                if let Some(entry) = self.cold.remove(&hash) {
                    self.cold_used -= entry.blocks;
                    self.evictions += 1;
                }
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> KvCacheStats {
        KvCacheStats {
            hot_blocks: self.hot_capacity,
            hot_used: self.hot_used,
            cold_blocks: self.cold_capacity,
            cold_used: self.cold_used,
            hot_utilization: self.hot_utilization(),
            hot_prefix_entries: self.hot.len(),
            cold_prefix_entries: self.cold.len(),
            hits: self.hits,
            misses: self.misses,
            hit_rate: self.hit_rate(),
            evictions: self.evictions,
            demotions: self.demotions,
            promotions: self.promotions,
        }
    }
}
