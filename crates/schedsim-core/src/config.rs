//! TOML configuration parsing for schedsim.
//!
//! Defines the complete configuration schema for simulation runs: cluster
//! shape, tiered KV cache parameters, compute model, scheduler policy, and
//! workload source. Validation is fail-fast at load time.

use crate::instance::ComputeModel;
use crate::kv_cache::TieredKvCache;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub simulation: SimulationSection,
    pub cluster: ClusterSection,
    #[serde(default)]
    pub kv_cache: KvCacheSection,
    #[serde(default)]
    pub compute: ComputeSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub workload: WorkloadSection,
}

/// General simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Human-readable name for this simulation.
    #[serde(default = "default_sim_name")]
    pub name: String,
    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Hard stop in ticks; 0 runs until the event queue drains.
    #[serde(default)]
    pub horizon_ticks: u64,
}

fn default_sim_name() -> String {
    "simulation".to_string()
}

fn default_seed() -> u64 {
    42
}

/// Cluster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSection {
    /// Number of independent serving instances.
    #[serde(default = "default_num_instances")]
    pub num_instances: u32,
    /// Concurrent compute slots per instance.
    #[serde(default = "default_max_running")]
    pub max_running_requests: u32,
}

fn default_num_instances() -> u32 {
    1
}
fn default_max_running() -> u32 {
    8
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            num_instances: default_num_instances(),
            max_running_requests: default_max_running(),
        }
    }
}

/// Tiered KV cache parameters, per instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvCacheSection {
    /// Hot tier capacity in blocks.
    #[serde(default = "default_hot_blocks")]
    pub hot_blocks: u32,
    /// Cold tier capacity in blocks; 0 disables the cold tier.
    #[serde(default = "default_cold_blocks")]
    pub cold_blocks: u32,
    /// Tokens per block.
    #[serde(default = "default_block_size")]
    pub block_size_tokens: u32,
    /// Cold-to-hot transfer throughput in tokens per tick.
    #[serde(default = "default_transfer_bandwidth")]
    pub transfer_bandwidth_tokens_per_tick: f64,
    /// Fixed per-transfer setup cost in ticks.
    #[serde(default)]
    pub transfer_base_latency_ticks: u64,
}

fn default_hot_blocks() -> u32 {
    4096
}
fn default_cold_blocks() -> u32 {
    16384
}
fn default_block_size() -> u32 {
    16
}
fn default_transfer_bandwidth() -> f64 {
    100.0
}

impl Default for KvCacheSection {
    fn default() -> Self {
        Self {
            hot_blocks: default_hot_blocks(),
            cold_blocks: default_cold_blocks(),
            block_size_tokens: default_block_size(),
            transfer_bandwidth_tokens_per_tick: default_transfer_bandwidth(),
            transfer_base_latency_ticks: 0,
        }
    }
}

/// Compute throughput parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeSection {
    #[serde(default = "default_prefill_tps")]
    pub prefill_tokens_per_sec: f64,
    #[serde(default = "default_decode_tps")]
    pub decode_tokens_per_sec: f64,
}

fn default_prefill_tps() -> f64 {
    50_000.0
}
fn default_decode_tps() -> f64 {
    100.0
}

impl Default for ComputeSection {
    fn default() -> Self {
        Self {
            prefill_tokens_per_sec: default_prefill_tps(),
            decode_tokens_per_sec: default_decode_tps(),
        }
    }
}

/// How the scheduler picks a victim when preempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VictimSelection {
    /// Preempt the running request with the lowest current score.
    LowestPriority,
    /// Preempt the request that has held its slot for the shortest time.
    MostRecentlyAdmitted,
}

/// Scheduler policy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Name of the priority scorer, resolved via the policies registry.
    #[serde(default = "default_scorer")]
    pub scorer: String,
    #[serde(default = "default_victim_selection")]
    pub victim_selection: VictimSelection,
}

fn default_scorer() -> String {
    "slo-weighted".to_string()
}

fn default_victim_selection() -> VictimSelection {
    VictimSelection::LowestPriority
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            scorer: default_scorer(),
            victim_selection: default_victim_selection(),
        }
    }
}

/// Workload source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSection {
    /// Format: "compact_jsonl" or "synthetic".
    #[serde(default = "default_workload_format")]
    pub format: String,
    /// Path to trace file (for compact_jsonl).
    pub path: Option<String>,
    /// Synthetic: request rate per second.
    pub rate: Option<f64>,
    /// Synthetic: duration in seconds.
    pub duration_sec: Option<u64>,
    /// Synthetic: mean prompt tokens.
    pub input_tokens_mean: Option<f64>,
    /// Synthetic: std dev of prompt tokens.
    pub input_tokens_std: Option<f64>,
    /// Synthetic: mean generation tokens.
    pub output_tokens_mean: Option<f64>,
    /// Synthetic: std dev of generation tokens.
    pub output_tokens_std: Option<f64>,
    /// Synthetic: number of distinct shared prefixes.
    pub num_prefixes: Option<u32>,
    /// Synthetic: mean prefix length in tokens.
    pub prefix_tokens_mean: Option<f64>,
    /// Synthetic: fraction of requests in the interactive class.
    pub interactive_fraction: Option<f64>,
}

fn default_workload_format() -> String {
    "compact_jsonl".to_string()
}

impl Default for WorkloadSection {
    fn default() -> Self {
        Self {
            format: default_workload_format(),
            path: None,
            rate: None,
            duration_sec: None,
            input_tokens_mean: None,
            input_tokens_std: None,
            output_tokens_mean: None,
            output_tokens_std: None,
            num_prefixes: None,
            prefix_tokens_mean: None,
            interactive_fraction: None,
        }
    }
}

impl WorkloadSection {
    /// Validate synthetic-workload parameters. Shared by config loading and
    /// the `gen-trace` CLI path, which builds a section straight from flags.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rate) = self.rate {
            if rate <= 0.0 {
                return Err(ConfigError::Validation(
                    "workload rate must be > 0".to_string(),
                ));
            }
        }
        if let Some(fraction) = self.interactive_fraction {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(ConfigError::Validation(
                    "interactive_fraction must be in [0, 1]".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.num_instances == 0 {
            return Err(ConfigError::Validation(
                "num_instances must be > 0".to_string(),
            ));
        }
        if self.cluster.max_running_requests == 0 {
            return Err(ConfigError::Validation(
                "max_running_requests must be > 0".to_string(),
            ));
        }
        if self.kv_cache.hot_blocks == 0 {
            return Err(ConfigError::Validation("hot_blocks must be > 0".to_string()));
        }
        if self.kv_cache.block_size_tokens == 0 {
            return Err(ConfigError::Validation(
                "block_size_tokens must be > 0".to_string(),
            ));
        }
        if self.kv_cache.transfer_bandwidth_tokens_per_tick <= 0.0 {
            return Err(ConfigError::Validation(
                "transfer_bandwidth_tokens_per_tick must be > 0".to_string(),
            ));
        }
        if self.compute.prefill_tokens_per_sec <= 0.0 {
            return Err(ConfigError::Validation(
                "prefill_tokens_per_sec must be > 0".to_string(),
            ));
        }
        if self.compute.decode_tokens_per_sec <= 0.0 {
            return Err(ConfigError::Validation(
                "decode_tokens_per_sec must be > 0".to_string(),
            ));
        }
        self.workload.validate()
    }

    /// The engine's per-instance compute model.
    pub fn compute_model(&self) -> ComputeModel {
        ComputeModel {
            prefill_tokens_per_sec: self.compute.prefill_tokens_per_sec,
            decode_tokens_per_sec: self.compute.decode_tokens_per_sec,
        }
    }

    /// Build one instance's cache from the cache section.
    pub fn build_kv_cache(&self) -> TieredKvCache {
        TieredKvCache::new(
            self.kv_cache.hot_blocks,
            self.kv_cache.cold_blocks,
            self.kv_cache.block_size_tokens,
            self.kv_cache.transfer_bandwidth_tokens_per_tick,
            self.kv_cache.transfer_base_latency_ticks,
        )
    }
}
