//! Virtual clock for discrete-event simulation.
//!
//! The [`SimClock`] tracks simulation time independently of wall-clock time,
//! advancing only when events are processed. This enables deterministic,
//! repeatable simulations regardless of host machine speed.

use serde::{Deserialize, Serialize};

/// Virtual simulation clock.
///
/// Time is tracked in ticks, where one tick is one microsecond of simulated
/// time. Conversion helpers expose milliseconds for reporting (matching
/// typical LLM latency scales).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    /// Current simulation time in ticks.
    current: u64,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    pub fn new() -> Self {
        Self { current: 0 }
    }

    /// Create a clock starting at a specific tick.
    pub fn starting_at(ticks: u64) -> Self {
        Self { current: ticks }
    }

    /// Current time in ticks.
    pub fn now(&self) -> u64 {
        self.current
    }

    /// Current time in milliseconds (truncating).
    pub fn now_ms(&self) -> u64 {
        self.current / 1000
    }

    /// Advance the clock to a specific tick.
    ///
    /// # Panics
    ///
    /// Panics if `ticks` is in the past. Event delivery order is the
    /// correctness foundation of the whole simulation, so a backward move is
    /// always a bug worth dying for.
    pub fn advance_to(&mut self, ticks: u64) {
        assert!(
            ticks >= self.current,
            "Cannot move clock backwards: current={}, target={}",
            self.current,
            ticks,
        );
        self.current = ticks;
    }

    /// Advance the clock by a duration in ticks.
    pub fn advance_by(&mut self, delta: u64) {
        self.current += delta;
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}
