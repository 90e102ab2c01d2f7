use criterion::{black_box, criterion_group, criterion_main, Criterion};
use schedsim_core::config::SimConfig;
use schedsim_core::request::Request;
use schedsim_policies::{scorer_by_name, SloClass};

fn sample_requests(n: usize) -> Vec<Request> {
    (0..n)
        .map(|i| {
            let slo = if i % 4 == 0 {
                SloClass::Interactive
            } else {
                SloClass::Batch
            };
            Request::new(
                i as u64,
                (i as u64) * 5_000,
                slo,
                256,
                64,
                Some((i % 10) as u64),
                128,
            )
        })
        .collect()
}

fn test_config(num_instances: u32) -> SimConfig {
    SimConfig::from_str(&format!(
        r#"
[simulation]
name = "bench"
seed = 42

[cluster]
num_instances = {}
max_running_requests = 8

[kv_cache]
hot_blocks = 4096
cold_blocks = 16384
block_size_tokens = 16
transfer_bandwidth_tokens_per_tick = 100.0
transfer_base_latency_ticks = 5
"#,
        num_instances
    ))
    .unwrap()
}

fn bench_simulation_1k(c: &mut Criterion) {
    let config = test_config(8);
    let requests = sample_requests(1_000);

    c.bench_function("simulate_1k_requests_8_instances", |b| {
        b.iter(|| {
            let scorer = scorer_by_name("slo-weighted").unwrap();
            schedsim_core::run_simulation(
                black_box(&config),
                black_box(requests.clone()),
                scorer,
            )
        })
    });
}

fn bench_simulation_10k(c: &mut Criterion) {
    let config = test_config(8);
    let requests = sample_requests(10_000);

    c.bench_function("simulate_10k_requests_8_instances", |b| {
        b.iter(|| {
            let scorer = scorer_by_name("prefix-affinity").unwrap();
            schedsim_core::run_simulation(
                black_box(&config),
                black_box(requests.clone()),
                scorer,
            )
        })
    });
}

criterion_group!(benches, bench_simulation_1k, bench_simulation_10k);
criterion_main!(benches);
