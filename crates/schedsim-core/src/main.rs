//! SchedSim CLI — Benchmark LLM scheduling policies without GPUs.

use clap::{Parser, Subcommand};
use schedsim_core::config::{SimConfig, WorkloadSection};
use schedsim_core::metrics;
use schedsim_core::trace;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "schedsim",
    about = "Benchmark LLM scheduling policies without GPUs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation with a single scorer.
    Run {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Path to workload trace file.
        #[arg(short, long)]
        trace: Option<PathBuf>,
        /// Priority scorer name; defaults to `scheduler.scorer` from the config.
        #[arg(short, long)]
        scorer: Option<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare multiple scorers on the same workload.
    Compare {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Path to workload trace file.
        #[arg(short, long)]
        trace: Option<PathBuf>,
        /// Comma-separated list of scorer names.
        #[arg(short = 'S', long, value_delimiter = ',')]
        scorers: Vec<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate a synthetic workload trace.
    GenTrace {
        /// Request rate (requests/sec).
        #[arg(long, default_value = "50")]
        rate: f64,
        /// Duration in seconds.
        #[arg(long, default_value = "60")]
        duration: u64,
        /// Mean prompt tokens.
        #[arg(long, default_value = "512")]
        input_mean: f64,
        /// Std dev of prompt tokens.
        #[arg(long, default_value = "128")]
        input_std: f64,
        /// Mean generation tokens.
        #[arg(long, default_value = "128")]
        output_mean: f64,
        /// Std dev of generation tokens.
        #[arg(long, default_value = "32")]
        output_std: f64,
        /// Number of distinct shared prefixes.
        #[arg(long, default_value = "8")]
        num_prefixes: u32,
        /// Mean prefix length in tokens.
        #[arg(long, default_value = "128")]
        prefix_mean: f64,
        /// Fraction of requests in the interactive class.
        #[arg(long, default_value = "0.5")]
        interactive_fraction: f64,
        /// Random seed.
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Output file path.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List available scorers.
    ListScorers,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            trace: trace_path,
            scorer,
            output,
        } => {
            let sim_config = SimConfig::from_file(&config).unwrap_or_else(|e| {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            });

            let requests = load_requests(&sim_config, trace_path.as_deref());
            let scorer_name = scorer.unwrap_or_else(|| sim_config.scheduler.scorer.clone());
            let scorer = schedsim_policies::scorer_by_name(&scorer_name).unwrap_or_else(|| {
                eprintln!(
                    "Unknown scorer: {}. Available: {:?}",
                    scorer_name,
                    schedsim_policies::available_scorers()
                );
                std::process::exit(1);
            });

            let result = schedsim_core::run_simulation(&sim_config, requests, scorer);
            println!("{}", metrics::format_table(&result));

            if let Some(output_path) = output {
                let json = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
                    eprintln!("Error serializing results: {}", e);
                    std::process::exit(1);
                });
                std::fs::write(&output_path, json).unwrap_or_else(|e| {
                    eprintln!("Error writing output: {}", e);
                    std::process::exit(1);
                });
                println!("Results written to {}", output_path.display());
            }
        }
        Commands::Compare {
            config,
            trace: trace_path,
            scorers,
            output,
        } => {
            let sim_config = SimConfig::from_file(&config).unwrap_or_else(|e| {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            });

            let requests = load_requests(&sim_config, trace_path.as_deref());
            let scorer_names: Vec<&str> = if scorers.is_empty() {
                schedsim_policies::available_scorers()
            } else {
                scorers.iter().map(|s| s.as_str()).collect()
            };

            let results = schedsim_core::compare_scorers(&sim_config, &requests, &scorer_names);
            println!("{}", metrics::format_comparison_table(&results));

            for result in &results {
                println!("{}", metrics::format_table(result));
            }

            if let Some(output_path) = output {
                let json = serde_json::to_string_pretty(&results).unwrap_or_else(|e| {
                    eprintln!("Error serializing results: {}", e);
                    std::process::exit(1);
                });
                std::fs::write(&output_path, json).unwrap_or_else(|e| {
                    eprintln!("Error writing output: {}", e);
                    std::process::exit(1);
                });
                println!("Results written to {}", output_path.display());
            }
        }
        Commands::GenTrace {
            rate,
            duration,
            input_mean,
            input_std,
            output_mean,
            output_std,
            num_prefixes,
            prefix_mean,
            interactive_fraction,
            seed,
            output,
        } => {
            let workload = WorkloadSection {
                format: "synthetic".to_string(),
                path: None,
                rate: Some(rate),
                duration_sec: Some(duration),
                input_tokens_mean: Some(input_mean),
                input_tokens_std: Some(input_std),
                output_tokens_mean: Some(output_mean),
                output_tokens_std: Some(output_std),
                num_prefixes: Some(num_prefixes),
                prefix_tokens_mean: Some(prefix_mean),
                interactive_fraction: Some(interactive_fraction),
            };
            if let Err(e) = workload.validate() {
                eprintln!("Invalid workload parameters: {}", e);
                std::process::exit(1);
            }
            let requests = trace::generate_synthetic(&workload, seed);
            trace::write_compact_jsonl(&requests, &output).unwrap_or_else(|e| {
                eprintln!("Error writing trace: {}", e);
                std::process::exit(1);
            });
            println!(
                "Generated {} requests to {}",
                requests.len(),
                output.display()
            );
        }
        Commands::ListScorers => {
            println!("Available scorers:");
            for name in schedsim_policies::available_scorers() {
                println!("  - {}", name);
            }
        }
    }
}

fn load_requests(
    config: &SimConfig,
    trace_path: Option<&std::path::Path>,
) -> Vec<schedsim_core::Request> {
    if config.workload.format == "synthetic" && trace_path.is_none() {
        return trace::generate_synthetic(&config.workload, config.simulation.seed);
    }

    let path = trace_path
        .map(PathBuf::from)
        .or_else(|| config.workload.path.as_ref().map(PathBuf::from));

    match path {
        Some(p) => trace::load_trace(&p, &config.workload.format).unwrap_or_else(|e| {
            eprintln!("Error loading trace: {}", e);
            std::process::exit(1);
        }),
        None => {
            eprintln!("No trace file specified. Use --trace or set workload.path in config.");
            std::process::exit(1);
        }
    }
}
