//! Simulation events and the deterministic event queue.
//!
//! Events are ordered by `(time, sequence)` where `sequence` is a
//! monotonically increasing insertion counter. Two events scheduled for the
//! same tick are therefore delivered in the order they were scheduled, which
//! makes every run with the same inputs bit-identical.

use crate::request::Request;
use std::collections::BinaryHeap;

/// The closed set of things that can happen in a simulation.
///
/// Every event is consumed exactly once by the engine's dispatch loop.
#[derive(Debug, Clone)]
pub enum SimEvent {
    /// A request enters an instance's wait queue.
    Arrival { instance_id: u32, request: Request },
    /// Re-evaluate admission and preemption for one instance.
    SchedulingTick { instance_id: u32 },
    /// One generated token for a running request.
    TokenStep {
        instance_id: u32,
        request_id: u64,
        epoch: u32,
    },
    /// A running request finished its last token.
    Completion {
        instance_id: u32,
        request_id: u64,
        epoch: u32,
    },
    /// Evict a running request in favor of a higher-priority one.
    Preemption {
        instance_id: u32,
        request_id: u64,
        epoch: u32,
    },
    /// A cold-to-hot prefix transfer finished.
    TransferComplete {
        instance_id: u32,
        request_id: u64,
        epoch: u32,
        prefix_hash: u64,
    },
}

impl SimEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SimEvent::Arrival { .. } => "arrival",
            SimEvent::SchedulingTick { .. } => "scheduling_tick",
            SimEvent::TokenStep { .. } => "token_step",
            SimEvent::Completion { .. } => "completion",
            SimEvent::Preemption { .. } => "preemption",
            SimEvent::TransferComplete { .. } => "transfer_complete",
        }
    }
}

/// An event with its delivery time and insertion sequence number.
struct TimedEvent {
    time: u64,
    sequence: u64,
    event: SimEvent,
}

impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl Eq for TimedEvent {}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse for min-heap: earliest time first, then lowest sequence.
        other
            .time
            .cmp(&self.time)
            .then(other.sequence.cmp(&self.sequence))
    }
}

/// Deterministic future-event queue.
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<TimedEvent>,
    sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            sequence: 0,
        }
    }

    /// Schedule `event` for delivery at `time`.
    ///
    /// # Panics
    ///
    /// Panics if `time` is earlier than `now` — scheduling into the past
    /// would silently reorder history.
    pub fn schedule(&mut self, time: u64, now: u64, event: SimEvent) {
        assert!(
            time >= now,
            "event {} scheduled into the past: time={}, now={}",
            event.kind(),
            time,
            now,
        );
        self.heap.push(TimedEvent {
            time,
            sequence: self.sequence,
            event,
        });
        self.sequence += 1;
    }

    /// Remove and return the next event. `None` means the simulation is done.
    pub fn pop_next(&mut self) -> Option<(u64, SimEvent)> {
        self.heap.pop().map(|timed| (timed.time, timed.event))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
