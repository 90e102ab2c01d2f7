//! Workload ingestion and synthetic generation.
//!
//! The on-disk format is compact JSONL: one JSON object per line with
//! minimal fields. Blank lines and `#` comments are skipped. The synthetic
//! generator produces the same record shape from a seeded RNG, so generated
//! workloads can be written out and replayed byte-identically.

use crate::config::WorkloadSection;
use crate::request::Request;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use schedsim_policies::SloClass;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Failed to read trace file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON at line {line}: {source}")]
    JsonParse {
        line: usize,
        source: serde_json::Error,
    },
    #[error("Unsupported trace format: {0}")]
    UnsupportedFormat(String),
    #[error("Workload has no path configured for format {0}")]
    MissingPath(String),
}

/// A compact JSONL trace record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactTraceRecord {
    /// Arrival time in ticks.
    pub ts: u64,
    /// Prompt token count.
    pub input_tokens: u32,
    /// Generation token count.
    pub output_tokens: u32,
    /// Optional prefix hash (string, will be hashed to u64).
    pub prefix_hash: Option<String>,
    /// Optional prefix length in tokens.
    pub prefix_tokens: Option<u32>,
    /// Optional service class: "interactive" or "batch" (default).
    pub slo: Option<SloClass>,
}

/// Load a trace from a file.
pub fn load_trace(path: &Path, format: &str) -> Result<Vec<Request>, TraceError> {
    match format {
        "compact_jsonl" | "jsonl" => load_compact_jsonl(path),
        other => Err(TraceError::UnsupportedFormat(other.to_string())),
    }
}

/// Load a compact JSONL trace file.
pub fn load_compact_jsonl(path: &Path) -> Result<Vec<Request>, TraceError> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    parse_compact_jsonl(reader)
}

/// Parse compact JSONL from any reader.
pub fn parse_compact_jsonl<R: Read>(reader: BufReader<R>) -> Result<Vec<Request>, TraceError> {
    let mut requests = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record: CompactTraceRecord =
            serde_json::from_str(trimmed).map_err(|e| TraceError::JsonParse {
                line: line_num + 1,
                source: e,
            })?;
        requests.push(record_to_request(requests.len() as u64, record));
    }

    // Sort by arrival time
    requests.sort_by_key(|r| r.arrival_time);
    Ok(requests)
}

/// Convert a compact trace record to a Request.
fn record_to_request(id: u64, record: CompactTraceRecord) -> Request {
    let prefix_hash = record.prefix_hash.as_ref().map(|s| hash_string(s));
    Request::new(
        id,
        record.ts,
        record.slo.unwrap_or(SloClass::Batch),
        record.input_tokens,
        record.output_tokens,
        prefix_hash,
        record.prefix_tokens.unwrap_or(0),
    )
}

/// Simple string hash using FNV-1a.
pub fn hash_string(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Write requests to compact JSONL format.
pub fn write_compact_jsonl(requests: &[Request], path: &Path) -> Result<(), TraceError> {
    use std::io::Write;
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);

    for req in requests {
        let record = serde_json::json!({
            "ts": req.arrival_time,
            "input_tokens": req.input_tokens,
            "output_tokens": req.output_tokens,
            "prefix_hash": req.prefix_hash.map(|h| format!("{:x}", h)),
            "prefix_tokens": if req.prefix_tokens > 0 { Some(req.prefix_tokens) } else { None },
            "slo": req.slo.as_str(),
        });
        serde_json::to_writer(&mut writer, &record)
            .map_err(|e| TraceError::JsonParse { line: 0, source: e })?;
        writeln!(writer)?;
    }
    Ok(())
}

/// Generate a synthetic workload from a seeded RNG. The same section and
/// seed always produce the same request list.
pub fn generate_synthetic(workload: &WorkloadSection, seed: u64) -> Vec<Request> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let rate = workload.rate.unwrap_or(50.0);
    let duration_ticks = workload.duration_sec.unwrap_or(10) * 1_000_000;
    let input_mean = workload.input_tokens_mean.unwrap_or(512.0);
    let input_std = workload.input_tokens_std.unwrap_or(128.0);
    let output_mean = workload.output_tokens_mean.unwrap_or(128.0);
    let output_std = workload.output_tokens_std.unwrap_or(32.0);
    let num_prefixes = workload.num_prefixes.unwrap_or(8);
    let prefix_mean = workload.prefix_tokens_mean.unwrap_or(128.0);
    let interactive_fraction = workload.interactive_fraction.unwrap_or(0.5);

    let mut requests = Vec::new();
    let mut now = 0u64;
    let mut id = 0u64;
    while now < duration_ticks {
        // Exponential interarrival at `rate` requests per second.
        let u: f64 = rng.gen_range(f64::EPSILON..1.0);
        now += (-u.ln() / rate * 1e6).ceil() as u64;
        if now >= duration_ticks {
            break;
        }

        let input_tokens = sample_tokens(&mut rng, input_mean, input_std);
        let output_tokens = sample_tokens(&mut rng, output_mean, output_std);
        let slo = if rng.gen_bool(interactive_fraction) {
            SloClass::Interactive
        } else {
            SloClass::Batch
        };
        let (prefix_hash, prefix_tokens) = if num_prefixes > 0 {
            let prefix_id = rng.gen_range(0..num_prefixes);
            let tokens = (prefix_mean as u32).min(input_tokens);
            (Some(hash_string(&format!("prefix-{prefix_id}"))), tokens)
        } else {
            (None, 0)
        };

        requests.push(Request::new(
            id,
            now,
            slo,
            input_tokens,
            output_tokens,
            prefix_hash,
            prefix_tokens,
        ));
        id += 1;
    }
    requests
}

fn sample_tokens(rng: &mut ChaCha8Rng, mean: f64, std: f64) -> u32 {
    let lo = (mean - std).max(1.0);
    let hi = mean + std;
    rng.gen_range(lo..=hi).round() as u32
}
