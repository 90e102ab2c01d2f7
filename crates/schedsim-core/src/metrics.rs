//! Metrics collection and aggregation for simulation runs.
//!
//! Tracks per-request lifecycle records (TTFT, queue wait, end-to-end),
//! throughput, cache statistics, preemption counts, and the conservation
//! identity: every injected request is either completed, still queued, or
//! still running when the run ends.

use crate::instance::Instance;
use crate::kv_cache::KvCacheStats;
use serde::{Deserialize, Serialize};

/// Per-request completion record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request_id: u64,
    pub instance_id: u32,
    pub arrival_time: u64,
    /// Tick of the admission that ran to completion.
    pub admission_time: u64,
    pub first_token_time: u64,
    pub completion_time: u64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub prefix_cache_hit: bool,
    pub preemptions: u32,
}

impl RequestRecord {
    pub fn ttft_ticks(&self) -> u64 {
        self.first_token_time.saturating_sub(self.arrival_time)
    }

    pub fn queue_wait_ticks(&self) -> u64 {
        self.admission_time.saturating_sub(self.arrival_time)
    }

    pub fn e2e_ticks(&self) -> u64 {
        self.completion_time.saturating_sub(self.arrival_time)
    }
}

/// Percentile values for a distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Percentiles {
    /// Compute percentiles from a slice of values.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                p50: 0.0,
                p75: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;

        Self {
            p50: percentile_sorted(&sorted, 50.0),
            p75: percentile_sorted(&sorted, 75.0),
            p90: percentile_sorted(&sorted, 90.0),
            p95: percentile_sorted(&sorted, 95.0),
            p99: percentile_sorted(&sorted, 99.0),
            min: sorted[0],
            max: sorted[n - 1],
            mean,
        }
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Aggregated metrics for an entire simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Scorer name.
    pub scorer: String,
    /// Virtual time when the run ended, in ticks.
    pub duration_ticks: u64,
    pub events_processed: u64,

    // Conservation counts
    pub injected: u64,
    pub completed: u64,
    pub still_queued: u64,
    pub still_running: u64,
    /// Total preemption events over the run.
    pub preemptions: u64,

    // Latency (milliseconds)
    pub ttft_ms: Percentiles,
    pub e2e_ms: Percentiles,
    pub queue_wait_ms: Percentiles,

    // Throughput
    pub requests_per_sec: f64,
    pub input_tokens_per_sec: f64,
    pub output_tokens_per_sec: f64,

    // Cache
    pub cache_hit_rate: f64,
    pub per_instance_cache_stats: Vec<KvCacheStats>,
    pub per_instance_completed: Vec<u64>,
}

/// Collector that accumulates lifecycle records during simulation.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    records: Vec<RequestRecord>,
    injected: u64,
    preemptions: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request entering the system.
    pub fn record_injection(&mut self) {
        self.injected += 1;
    }

    /// Record a completed request.
    pub fn record_completion(&mut self, record: RequestRecord) {
        self.records.push(record);
    }

    /// Count a preemption event.
    pub fn record_preemption(&mut self) {
        self.preemptions += 1;
    }

    pub fn injected_count(&self) -> u64 {
        self.injected
    }

    pub fn completed_count(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn preemption_count(&self) -> u64 {
        self.preemptions
    }

    /// Per-request records, in completion order.
    pub fn records(&self) -> &[RequestRecord] {
        &self.records
    }

    /// Aggregate everything into a report.
    ///
    /// # Panics
    ///
    /// Panics if the conservation identity does not hold — losing or
    /// duplicating a request is always an engine bug.
    pub fn aggregate(
        &self,
        scorer: &str,
        duration_ticks: u64,
        events_processed: u64,
        instances: &[Instance],
        still_queued: u64,
        still_running: u64,
    ) -> SimulationReport {
        let completed = self.completed_count();
        assert_eq!(
            self.injected,
            completed + still_queued + still_running,
            "conservation violated: injected={}, completed={}, still_queued={}, still_running={}",
            self.injected,
            completed,
            still_queued,
            still_running,
        );

        let ttft_values: Vec<f64> = self
            .records
            .iter()
            .map(|r| r.ttft_ticks() as f64 / 1000.0)
            .collect();
        let e2e_values: Vec<f64> = self
            .records
            .iter()
            .map(|r| r.e2e_ticks() as f64 / 1000.0)
            .collect();
        let queue_values: Vec<f64> = self
            .records
            .iter()
            .map(|r| r.queue_wait_ticks() as f64 / 1000.0)
            .collect();

        let duration_sec = duration_ticks as f64 / 1e6;
        let total_input_tokens: u64 = self.records.iter().map(|r| r.input_tokens as u64).sum();
        let total_output_tokens: u64 = self.records.iter().map(|r| r.output_tokens as u64).sum();

        let per_instance_cache_stats: Vec<KvCacheStats> =
            instances.iter().map(|i| i.kv_cache.stats()).collect();
        let per_instance_completed: Vec<u64> =
            instances.iter().map(|i| i.total_completed).collect();

        let total_hits: u64 = per_instance_cache_stats.iter().map(|s| s.hits).sum();
        let total_lookups: u64 = per_instance_cache_stats
            .iter()
            .map(|s| s.hits + s.misses)
            .sum();
        let cache_hit_rate = if total_lookups > 0 {
            total_hits as f64 / total_lookups as f64
        } else {
            0.0
        };

        SimulationReport {
            scorer: scorer.to_string(),
            duration_ticks,
            events_processed,
            injected: self.injected,
            completed,
            still_queued,
            still_running,
            preemptions: self.preemptions,
            ttft_ms: Percentiles::from_values(&ttft_values),
            e2e_ms: Percentiles::from_values(&e2e_values),
            queue_wait_ms: Percentiles::from_values(&queue_values),
            requests_per_sec: if duration_sec > 0.0 {
                completed as f64 / duration_sec
            } else {
                0.0
            },
            input_tokens_per_sec: if duration_sec > 0.0 {
                total_input_tokens as f64 / duration_sec
            } else {
                0.0
            },
            output_tokens_per_sec: if duration_sec > 0.0 {
                total_output_tokens as f64 / duration_sec
            } else {
                0.0
            },
            cache_hit_rate,
            per_instance_cache_stats,
            per_instance_completed,
        }
    }
}

/// Format a report as a pretty-printed table string.
pub fn format_table(report: &SimulationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{:=<70}\n",
        format!("  {} Results  ", report.scorer)
    ));
    out.push_str(&format!(
        "  Duration: {:.3}s | Events: {}\n",
        report.duration_ticks as f64 / 1e6,
        report.events_processed,
    ));
    out.push_str(&format!(
        "  Requests: {} injected = {} completed + {} queued + {} running\n",
        report.injected, report.completed, report.still_queued, report.still_running,
    ));
    out.push_str(&format!("  Preemptions: {}\n", report.preemptions));
    out.push_str(&format!("{:-<70}\n", "  Latency  "));
    out.push_str(&format!(
        "  TTFT (ms)       P50={:>8.1}  P90={:>8.1}  P99={:>8.1}\n",
        report.ttft_ms.p50, report.ttft_ms.p90, report.ttft_ms.p99
    ));
    out.push_str(&format!(
        "  E2E (ms)        P50={:>8.1}  P90={:>8.1}  P99={:>8.1}\n",
        report.e2e_ms.p50, report.e2e_ms.p90, report.e2e_ms.p99
    ));
    out.push_str(&format!(
        "  Queue wait (ms) P50={:>8.1}  P90={:>8.1}  P99={:>8.1}\n",
        report.queue_wait_ms.p50, report.queue_wait_ms.p90, report.queue_wait_ms.p99
    ));
    out.push_str(&format!("{:-<70}\n", "  Throughput  "));
    out.push_str(&format!(
        "  Requests/sec: {:.1}  Tokens/sec: {:.0} (input: {:.0}, output: {:.0})\n",
        report.requests_per_sec,
        report.input_tokens_per_sec + report.output_tokens_per_sec,
        report.input_tokens_per_sec,
        report.output_tokens_per_sec,
    ));
    out.push_str(&format!("{:-<70}\n", "  Cache  "));
    out.push_str(&format!(
        "  Prefix hit rate: {:.1}%\n",
        report.cache_hit_rate * 100.0
    ));
    for stats in &report.per_instance_cache_stats {
        out.push_str(&format!(
            "    hot {}/{} blocks, cold {}/{}, evictions {}, demotions {}, promotions {}\n",
            stats.hot_used,
            stats.hot_blocks,
            stats.cold_used,
            stats.cold_blocks,
            stats.evictions,
            stats.demotions,
            stats.promotions,
        ));
    }
    out.push_str(&format!("{:=<70}\n", ""));
    out
}

/// Format a comparison table of multiple scorer results.
pub fn format_comparison_table(results: &[SimulationReport]) -> String {
    if results.is_empty() {
        return String::from("No results to compare.\n");
    }

    let mut out = String::new();
    out.push_str(&format!("\n{:=<90}\n", "  Scorer Comparison  "));
    out.push_str(&format!(
        "{:<18} {:>9} {:>9} {:>9} {:>9} {:>8} {:>8} {:>9}\n",
        "Scorer", "TTFT p50", "TTFT p99", "E2E p50", "E2E p99", "Req/s", "Cache%", "Preempt"
    ));
    out.push_str(&format!("{:-<90}\n", ""));

    for r in results {
        out.push_str(&format!(
            "{:<18} {:>9.1} {:>9.1} {:>9.1} {:>9.1} {:>8.1} {:>7.1}% {:>9}\n",
            r.scorer,
            r.ttft_ms.p50,
            r.ttft_ms.p99,
            r.e2e_ms.p50,
            r.e2e_ms.p99,
            r.requests_per_sec,
            r.cache_hit_rate * 100.0,
            r.preemptions,
        ));
    }
    out.push_str(&format!("{:=<90}\n", ""));
    out
}
