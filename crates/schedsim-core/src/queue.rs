//! Admission wait queue.
//!
//! Requests wait here in insertion order. Selection is score-driven but the
//! order of the queue itself is the tie-break: among equal scores the request
//! closest to the front wins, which gives pure FCFS under a constant scorer
//! and puts preempted requests (re-inserted at the front) ahead of everyone
//! of equal priority.

use crate::request::{Request, RequestState};
use schedsim_policies::{Clock, InstanceSnapshot, PriorityScorer, RequestInfo};
use std::collections::VecDeque;

/// Insertion-ordered wait queue with scored selection.
#[derive(Default)]
pub struct WaitQueue {
    queue: VecDeque<Request>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Append a newly arrived request at the tail.
    pub fn enqueue(&mut self, request: Request) {
        assert_eq!(
            request.state,
            RequestState::Queued,
            "request {} enqueued in state {:?}",
            request.id,
            request.state,
        );
        self.queue.push_back(request);
    }

    /// Re-insert a preempted request at the head of the queue.
    pub fn requeue_front(&mut self, request: Request) {
        assert_eq!(request.state, RequestState::Queued);
        self.queue.push_front(request);
    }

    /// Index of the highest-scoring request, re-scoring the whole queue.
    /// Ties go to the lower index (closer to the front).
    pub fn select_best(
        &self,
        scorer: &dyn PriorityScorer,
        state: &InstanceSnapshot,
        clock: &dyn Clock,
    ) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, request) in self.queue.iter().enumerate() {
            let score = scorer.score(&to_request_info(request), state, clock);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((idx, score)),
            }
        }
        best
    }

    /// Borrow the request at `idx`.
    pub fn get(&self, idx: usize) -> &Request {
        &self.queue[idx]
    }

    /// Remove and return the request at `idx`.
    pub fn remove(&mut self, idx: usize) -> Request {
        self.queue
            .remove(idx)
            .unwrap_or_else(|| panic!("wait queue index {} out of bounds", idx))
    }

    pub fn front(&self) -> Option<&Request> {
        self.queue.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drain every queued request (horizon accounting).
    pub fn drain(&mut self) -> impl Iterator<Item = Request> + '_ {
        self.queue.drain(..)
    }
}

/// Project a request into the scorer-visible view.
pub fn to_request_info(request: &Request) -> RequestInfo {
    RequestInfo {
        id: request.id,
        arrival_time: request.arrival_time,
        slo: request.slo,
        input_tokens: request.input_tokens,
        remaining_output: request.remaining_output,
        prefix_hash: request.prefix_hash,
        prefix_tokens: request.prefix_tokens,
        preemptions: request.preemptions,
    }
}
