//! Prefix-cache-affinity scoring.
//!
//! Boosts requests whose shared prefix is already resident on the instance,
//! so admissions ride existing cache state instead of churning it. Falls back
//! to plain SLO-weighted scoring for requests without a prefix.

use crate::slo_weighted::SloWeighted;
use crate::traits::*;

/// Blends the SLO-weighted score with a cache-residency bonus.
///
/// A hot-resident prefix earns the full bonus; a cold-resident prefix earns
/// half (it is reusable but must be transferred back first); an absent prefix
/// earns nothing.
pub struct PrefixAffinity {
    /// Weight for the cache bonus vs the SLO score (0.0 = pure SLO, 1.0 = pure cache).
    cache_weight: f64,
    slo: SloWeighted,
}

impl PrefixAffinity {
    pub fn new() -> Self {
        Self {
            cache_weight: 0.8,
            slo: SloWeighted::new(),
        }
    }

    pub fn with_cache_weight(cache_weight: f64) -> Self {
        Self {
            cache_weight: cache_weight.clamp(0.0, 1.0),
            slo: SloWeighted::new(),
        }
    }

    fn cache_score(&self, request: &RequestInfo, state: &InstanceSnapshot) -> f64 {
        let hash = match request.prefix_hash {
            Some(h) => h,
            None => return 0.0,
        };
        if state.hot_prefixes.contains(&hash) {
            1.0
        } else if state.cold_prefixes.contains(&hash) {
            0.5
        } else {
            0.0
        }
    }
}

impl Default for PrefixAffinity {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityScorer for PrefixAffinity {
    fn score(&self, request: &RequestInfo, state: &InstanceSnapshot, clock: &dyn Clock) -> f64 {
        // Normalize the SLO score by the interactive class weight so the two
        // terms blend on comparable scales.
        let slo_score = self.slo.score(request, state, clock) / self.slo.class_weight(SloClass::Interactive);
        let cache_score = self.cache_score(request, state);
        self.cache_weight * cache_score + (1.0 - self.cache_weight) * slo_score
    }

    fn name(&self) -> &str {
        "prefix-affinity"
    }
}
