//! SLO-class weighted scoring with an anti-starvation age term.

use crate::traits::*;

/// Scores requests by service class, with a small bonus that grows with time
/// spent waiting so batch requests cannot starve indefinitely behind a steady
/// interactive stream.
///
/// `score = class_weight + age_weight * (now - arrival_time)`
pub struct SloWeighted {
    interactive_weight: f64,
    batch_weight: f64,
    /// Priority gained per tick of waiting.
    age_weight: f64,
}

impl SloWeighted {
    pub fn new() -> Self {
        Self {
            interactive_weight: 10.0,
            batch_weight: 1.0,
            age_weight: 1e-6,
        }
    }

    pub fn with_weights(interactive_weight: f64, batch_weight: f64, age_weight: f64) -> Self {
        Self {
            interactive_weight,
            batch_weight,
            age_weight,
        }
    }

    pub(crate) fn class_weight(&self, slo: SloClass) -> f64 {
        match slo {
            SloClass::Interactive => self.interactive_weight,
            SloClass::Batch => self.batch_weight,
        }
    }
}

impl Default for SloWeighted {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityScorer for SloWeighted {
    fn score(&self, request: &RequestInfo, _state: &InstanceSnapshot, clock: &dyn Clock) -> f64 {
        let age = clock.now().saturating_sub(request.arrival_time);
        self.class_weight(request.slo) + self.age_weight * age as f64
    }

    fn name(&self) -> &str {
        "slo-weighted"
    }
}
