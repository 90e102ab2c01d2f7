//! Discrete-event simulation engine.
//!
//! The engine pops events off the deterministic event queue, advances the
//! virtual clock, and dispatches to per-event handlers that may schedule
//! further events. Admission, preemption, and tier promotion all flow
//! through this loop; nothing observes wall-clock time.

use crate::clock::SimClock;
use crate::config::{SimConfig, VictimSelection};
use crate::event::{EventQueue, SimEvent};
use crate::instance::Instance;
use crate::metrics::{MetricsCollector, RequestRecord, SimulationReport};
use crate::queue::to_request_info;
use crate::request::Request;
use schedsim_policies::{Clock, PriorityScorer};
use tracing::{debug, trace, warn};

/// Clock adapter implementing the policies crate's Clock trait.
struct ClockAdapter<'a>(&'a SimClock);

impl<'a> Clock for ClockAdapter<'a> {
    fn now(&self) -> u64 {
        self.0.now()
    }
}

/// The main simulation engine.
pub struct SimulationEngine {
    /// Virtual clock.
    pub clock: SimClock,
    /// Deterministic future-event queue.
    events: EventQueue,
    /// Simulated serving instances.
    pub instances: Vec<Instance>,
    /// Metrics collector.
    pub metrics: MetricsCollector,
    /// Priority scorer driving admission and preemption.
    scorer: Box<dyn PriorityScorer>,
    victim_selection: VictimSelection,
    /// Hard stop in ticks; 0 means run until the event queue drains.
    horizon: u64,
    /// Total events processed.
    pub events_processed: u64,
}

impl SimulationEngine {
    /// Create a new simulation engine from config and scorer.
    pub fn new(config: &SimConfig, scorer: Box<dyn PriorityScorer>) -> Self {
        let compute = config.compute_model();
        let instances = (0..config.cluster.num_instances)
            .map(|id| {
                Instance::new(
                    id,
                    config.cluster.max_running_requests,
                    compute,
                    config.build_kv_cache(),
                )
            })
            .collect();

        Self {
            clock: SimClock::new(),
            events: EventQueue::new(),
            instances,
            metrics: MetricsCollector::new(),
            scorer,
            victim_selection: config.scheduler.victim_selection,
            horizon: config.simulation.horizon_ticks,
            events_processed: 0,
        }
    }

    /// Load a workload into the event queue, assigning requests to
    /// instances round-robin. Routing proper is an upstream concern.
    pub fn load_workload(&mut self, requests: Vec<Request>) {
        let num_instances = self.instances.len() as u64;
        for (i, request) in requests.into_iter().enumerate() {
            let instance_id = (i as u64 % num_instances) as u32;
            self.events.schedule(
                request.arrival_time,
                self.clock.now(),
                SimEvent::Arrival {
                    instance_id,
                    request,
                },
            );
        }
    }

    /// Run the simulation until the event queue drains or the horizon is
    /// reached, then aggregate a report.
    pub fn run(&mut self) -> SimulationReport {
        while let Some((time, event)) = self.events.pop_next() {
            if self.horizon > 0 && time > self.horizon {
                debug!(time, horizon = self.horizon, "horizon reached");
                break;
            }
            self.clock.advance_to(time);
            trace!(time, kind = event.kind(), "dispatch");
            self.process_event(event);
            self.events_processed += 1;
        }

        let still_queued: u64 = self.instances.iter().map(|i| i.wait_queue.len() as u64).sum();
        let still_running: u64 = self.instances.iter().map(|i| i.running.len() as u64).sum();
        self.metrics.aggregate(
            self.scorer.name(),
            self.clock.now(),
            self.events_processed,
            &self.instances,
            still_queued,
            still_running,
        )
    }

    fn process_event(&mut self, event: SimEvent) {
        match event {
            SimEvent::Arrival {
                instance_id,
                request,
            } => self.handle_arrival(instance_id, request),
            SimEvent::SchedulingTick { instance_id } => self.handle_scheduling_tick(instance_id),
            SimEvent::TokenStep {
                instance_id,
                request_id,
                epoch,
            } => self.handle_token_step(instance_id, request_id, epoch),
            SimEvent::Completion {
                instance_id,
                request_id,
                epoch,
            } => self.handle_completion(instance_id, request_id, epoch),
            SimEvent::Preemption {
                instance_id,
                request_id,
                epoch,
            } => self.handle_preemption(instance_id, request_id, epoch),
            SimEvent::TransferComplete {
                instance_id,
                request_id,
                epoch,
                prefix_hash,
            } => self.handle_transfer_complete(instance_id, request_id, epoch, prefix_hash),
        }
    }

    /// A request enters its instance's wait queue.
    fn handle_arrival(&mut self, instance_id: u32, request: Request) {
        let now = self.clock.now();
        debug!(request_id = request.id, instance_id, "arrival");
        self.metrics.record_injection();
        let inst = &mut self.instances[instance_id as usize];
        inst.wait_queue.enqueue(request);
        if !inst.tick_pending {
            inst.tick_pending = true;
            self.events
                .schedule(now, now, SimEvent::SchedulingTick { instance_id });
        }
    }

    /// Re-evaluate admission for one instance: admit as many top-scoring
    /// requests as capacity allows, then consider at most one preemption.
    fn handle_scheduling_tick(&mut self, instance_id: u32) {
        let now = self.clock.now();
        self.instances[instance_id as usize].tick_pending = false;

        loop {
            let snapshot = self.instances[instance_id as usize].snapshot();
            let adapter = ClockAdapter(&self.clock);
            let (idx, score) = match self.instances[instance_id as usize]
                .wait_queue
                .select_best(self.scorer.as_ref(), &snapshot, &adapter)
            {
                Some(best) => best,
                None => break,
            };

            if self.try_admit(instance_id, idx, now) {
                continue;
            }

            // Contention. One preemption at most, then the tick ends; the
            // requeued victim cannot trigger another preemption until the
            // next tick. No victim means this tick is a normal no-op.
            if let Some((victim_id, victim_epoch)) = self.select_victim(instance_id, score) {
                debug!(instance_id, victim = victim_id, "scheduling preemption");
                self.events.schedule(
                    now,
                    now,
                    SimEvent::Preemption {
                        instance_id,
                        request_id: victim_id,
                        epoch: victim_epoch,
                    },
                );
            } else {
                warn!(
                    instance_id,
                    queue_depth = snapshot.queue_depth,
                    "tick no-op under contention"
                );
            }
            break;
        }
    }

    /// Try to admit the queued request at `idx`. Returns false when the
    /// instance is out of slots or the cache cannot fit the request.
    fn try_admit(&mut self, instance_id: u32, idx: usize, now: u64) -> bool {
        let inst = &mut self.instances[instance_id as usize];
        if !inst.has_free_slot() {
            return false;
        }

        let (request_id, input_tokens, output_tokens, prefix_hash, prefix_tokens) = {
            let r = inst.wait_queue.get(idx);
            (r.id, r.input_tokens, r.output_tokens, r.prefix_hash, r.prefix_tokens)
        };
        let outcome = match inst.kv_cache.allocate_for_request(
            request_id,
            input_tokens,
            output_tokens,
            prefix_hash,
            prefix_tokens,
            now,
        ) {
            Some(outcome) => outcome,
            None => return false,
        };

        let mut request = inst.wait_queue.remove(idx);
        request.admit(now);
        request.prefix_cache_hit = outcome.prefix_hit.is_some();

        if outcome.transfer_ticks > 0 {
            if let Some(hash) = request.prefix_hash {
                self.events.schedule(
                    now + outcome.transfer_ticks,
                    now,
                    SimEvent::TransferComplete {
                        instance_id,
                        request_id: request.id,
                        epoch: request.epoch,
                        prefix_hash: hash,
                    },
                );
            }
        }

        // Prefill starts once the prefix is usable; the first token lands
        // at the end of prefill.
        let prefill = inst.compute.prefill_ticks(outcome.prefill_tokens);
        self.events.schedule(
            now + outcome.transfer_ticks + prefill,
            now,
            SimEvent::TokenStep {
                instance_id,
                request_id: request.id,
                epoch: request.epoch,
            },
        );

        debug!(
            request_id = request.id,
            instance_id,
            prefill_tokens = outcome.prefill_tokens,
            transfer_ticks = outcome.transfer_ticks,
            cache_hit = request.prefix_cache_hit,
            "admitted"
        );
        inst.running.insert(request.id, request);
        true
    }

    /// Pick the running request to evict in favor of a queued candidate
    /// with `candidate_score`. Only requests scoring strictly below the
    /// candidate are eligible.
    fn select_victim(&self, instance_id: u32, candidate_score: f64) -> Option<(u64, u32)> {
        let inst = &self.instances[instance_id as usize];
        let snapshot = inst.snapshot();
        let adapter = ClockAdapter(&self.clock);
        // A request that already produced its last token is about to
        // complete and free the slot anyway; never evict it.
        let eligible = inst.running.values().filter_map(|r| {
            if r.remaining_output == 0 {
                return None;
            }
            let score = self.scorer.score(&to_request_info(r), &snapshot, &adapter);
            (score < candidate_score).then_some((score, r))
        });

        match self.victim_selection {
            VictimSelection::LowestPriority => eligible
                .min_by(|a, b| {
                    a.0.partial_cmp(&b.0)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.1.admission_time.cmp(&b.1.admission_time))
                        .then_with(|| a.1.id.cmp(&b.1.id))
                })
                .map(|(_, r)| (r.id, r.epoch)),
            VictimSelection::MostRecentlyAdmitted => eligible
                .max_by(|a, b| {
                    a.1.admission_time
                        .cmp(&b.1.admission_time)
                        .then_with(|| a.1.id.cmp(&b.1.id))
                })
                .map(|(_, r)| (r.id, r.epoch)),
        }
    }

    /// Evict a running request: demote its prefix, requeue it at the head.
    fn handle_preemption(&mut self, instance_id: u32, request_id: u64, epoch: u32) {
        let now = self.clock.now();
        let inst = &mut self.instances[instance_id as usize];
        let mut request = match inst.running.remove(&request_id) {
            Some(r) if r.epoch == epoch => r,
            Some(r) => {
                // Stale event from before a previous preemption.
                inst.running.insert(r.id, r);
                return;
            }
            None => return,
        };

        if request.remaining_output == 0 {
            // The victim emitted its final token after this preemption was
            // scheduled; its completion is already in flight this tick.
            inst.running.insert(request.id, request);
            return;
        }

        request.mark_preempted();
        inst.kv_cache.demote_for_preemption(request_id, now);
        self.metrics.record_preemption();
        debug!(
            request_id,
            instance_id,
            preemptions = request.preemptions,
            "preempted"
        );
        request.requeue();
        inst.wait_queue.requeue_front(request);

        if !inst.tick_pending {
            inst.tick_pending = true;
            self.events
                .schedule(now, now, SimEvent::SchedulingTick { instance_id });
        }
    }

    /// One generated token; schedules the next step or the completion.
    fn handle_token_step(&mut self, instance_id: u32, request_id: u64, epoch: u32) {
        let now = self.clock.now();
        let inst = &mut self.instances[instance_id as usize];
        let decode_interval = inst.compute.decode_interval_ticks();
        let remaining = {
            let request = match inst.running.get_mut(&request_id) {
                Some(r) if r.epoch == epoch => r,
                _ => {
                    trace!(request_id, instance_id, "stale token step dropped");
                    return;
                }
            };
            request.record_token(now);
            request.remaining_output
        };
        inst.total_tokens_generated += 1;

        if remaining == 0 {
            self.events.schedule(
                now,
                now,
                SimEvent::Completion {
                    instance_id,
                    request_id,
                    epoch,
                },
            );
        } else {
            self.events.schedule(
                now + decode_interval,
                now,
                SimEvent::TokenStep {
                    instance_id,
                    request_id,
                    epoch,
                },
            );
        }
    }

    /// A request finished: release cache, record the lifecycle metric,
    /// and give the queue another chance at the freed slot.
    fn handle_completion(&mut self, instance_id: u32, request_id: u64, epoch: u32) {
        let now = self.clock.now();
        let inst = &mut self.instances[instance_id as usize];
        let mut request = match inst.running.remove(&request_id) {
            Some(r) if r.epoch == epoch => r,
            Some(r) => {
                inst.running.insert(r.id, r);
                return;
            }
            None => return,
        };

        request.complete(now);
        inst.kv_cache.release_request(request_id, now);
        inst.total_completed += 1;

        let record = RequestRecord {
            request_id,
            instance_id,
            arrival_time: request.arrival_time,
            admission_time: request.admission_time.unwrap_or(request.arrival_time),
            first_token_time: request.first_token_time.unwrap_or(now),
            completion_time: now,
            input_tokens: request.input_tokens,
            output_tokens: request.output_tokens,
            prefix_cache_hit: request.prefix_cache_hit,
            preemptions: request.preemptions,
        };
        self.metrics.record_completion(record);
        debug!(request_id, instance_id, "completed");

        if !inst.tick_pending && !inst.wait_queue.is_empty() {
            inst.tick_pending = true;
            self.events
                .schedule(now, now, SimEvent::SchedulingTick { instance_id });
        }
    }

    /// A cold-to-hot promotion landed.
    fn handle_transfer_complete(
        &mut self,
        instance_id: u32,
        request_id: u64,
        _epoch: u32,
        prefix_hash: u64,
    ) {
        let inst = &mut self.instances[instance_id as usize];
        inst.kv_cache.mark_transfer_complete(prefix_hash);
        trace!(request_id, instance_id, prefix_hash, "transfer complete");
    }

    /// Number of pending events.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}
