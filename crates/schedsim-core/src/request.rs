//! Request model for LLM inference simulation.
//!
//! Each [`Request`] represents a single inference call with token counts,
//! an SLO class, optional prefix information for cache reuse, and lifecycle
//! timestamps. State transitions are enforced here so an illegal move (for
//! example admitting a request twice) fails immediately instead of silently
//! corrupting the conservation counts.

use schedsim_policies::SloClass;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a request.
///
/// Legal transitions: `Queued → Running → {Completed | Preempted}` and
/// `Preempted → Queued`. A preempted request re-enters the queue within the
/// same event, so only Queued / Running / Completed are observable between
/// events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Queued,
    Running,
    Preempted,
    Completed,
}

/// A single LLM inference request flowing through the simulated system.
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique request identifier.
    pub id: u64,
    /// Arrival time in ticks.
    pub arrival_time: u64,
    /// Service class, consulted by scorers.
    pub slo: SloClass,
    /// Number of tokens in the prompt.
    pub input_tokens: u32,
    /// Number of tokens to generate.
    pub output_tokens: u32,
    /// Tokens still to generate; decremented by each token step.
    pub remaining_output: u32,
    /// Hash of the system prompt / shared prefix for cache reuse.
    pub prefix_hash: Option<u64>,
    /// Length of the shared prefix in tokens.
    pub prefix_tokens: u32,
    pub state: RequestState,
    /// Bumped on every preemption; in-flight events carrying an older epoch
    /// are discarded on delivery.
    pub epoch: u32,
    /// How many times this request has been preempted.
    pub preemptions: u32,
    /// Tick of the most recent admission.
    pub admission_time: Option<u64>,
    pub first_token_time: Option<u64>,
    pub completion_time: Option<u64>,
    /// Whether the most recent admission reused a resident prefix.
    pub prefix_cache_hit: bool,
}

impl Request {
    pub fn new(
        id: u64,
        arrival_time: u64,
        slo: SloClass,
        input_tokens: u32,
        output_tokens: u32,
        prefix_hash: Option<u64>,
        prefix_tokens: u32,
    ) -> Self {
        // A zero-output request still produces its prompt's final token.
        let output_tokens = output_tokens.max(1);
        Self {
            id,
            arrival_time,
            slo,
            input_tokens,
            output_tokens,
            remaining_output: output_tokens,
            prefix_hash,
            prefix_tokens,
            state: RequestState::Queued,
            epoch: 0,
            preemptions: 0,
            admission_time: None,
            first_token_time: None,
            completion_time: None,
            prefix_cache_hit: false,
        }
    }

    /// Total tokens this request will occupy in cache (prompt + generation).
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Prompt tokens that need prefill computation when the prefix is resident.
    pub fn non_prefix_input_tokens(&self) -> u32 {
        self.input_tokens.saturating_sub(self.prefix_tokens)
    }

    /// `Queued → Running`.
    pub fn admit(&mut self, now: u64) {
        assert_eq!(
            self.state,
            RequestState::Queued,
            "request {} admitted from state {:?}",
            self.id,
            self.state,
        );
        self.state = RequestState::Running;
        self.admission_time = Some(now);
    }

    /// `Running → Preempted`. Bumps the epoch so stale token/completion
    /// events scheduled before the preemption are dropped on delivery.
    pub fn mark_preempted(&mut self) {
        assert_eq!(
            self.state,
            RequestState::Running,
            "request {} preempted from state {:?}",
            self.id,
            self.state,
        );
        self.state = RequestState::Preempted;
        self.epoch += 1;
        self.preemptions += 1;
    }

    /// `Preempted → Queued`.
    pub fn requeue(&mut self) {
        assert_eq!(
            self.state,
            RequestState::Preempted,
            "request {} requeued from state {:?}",
            self.id,
            self.state,
        );
        self.state = RequestState::Queued;
        self.admission_time = None;
        self.first_token_time = None;
    }

    /// Record one generated token.
    pub fn record_token(&mut self, now: u64) {
        assert_eq!(self.state, RequestState::Running);
        assert!(self.remaining_output > 0, "request {} over-generated", self.id);
        if self.first_token_time.is_none() {
            self.first_token_time = Some(now);
        }
        self.remaining_output -= 1;
    }

    /// `Running → Completed`.
    pub fn complete(&mut self, now: u64) {
        assert_eq!(
            self.state,
            RequestState::Running,
            "request {} completed from state {:?}",
            self.id,
            self.state,
        );
        assert_eq!(self.remaining_output, 0);
        self.state = RequestState::Completed;
        self.completion_time = Some(now);
    }

    pub fn is_complete(&self) -> bool {
        self.state == RequestState::Completed
    }
}
