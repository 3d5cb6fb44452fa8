//! 探针状态聚合基准测试
//!
//! 测试结果聚合和事件序列化的开销

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use workspace_probe::error::ProbeFailure;
use workspace_probe::probe::{ProbeEvent, ProbeOutcome, ProbeResultAggregator, Transition};

/// 结果聚合基准测试
fn aggregator_benchmark(c: &mut Criterion) {
    let flapping: Vec<ProbeOutcome> = (0..1000)
        .map(|i| {
            if i % 7 < 4 {
                ProbeOutcome::Success
            } else {
                ProbeOutcome::Failure(ProbeFailure::Timeout)
            }
        })
        .collect();

    c.bench_function("aggregate_flapping_readiness", |b| {
        b.iter(|| {
            let mut aggregator = ProbeResultAggregator::new(3, 3, false).unwrap();
            let mut transitions = 0usize;
            for outcome in &flapping {
                transitions += aggregator.apply(black_box(outcome)).len();
            }
            black_box(transitions)
        });
    });

    c.bench_function("aggregate_steady_success", |b| {
        let outcome = ProbeOutcome::Success;
        let mut aggregator = ProbeResultAggregator::new(1, 3, true).unwrap();
        b.iter(|| black_box(aggregator.apply(black_box(&outcome))));
    });
}

/// 事件序列化基准测试
fn event_serialization_benchmark(c: &mut Criterion) {
    c.bench_function("probe_event_serialization", |b| {
        let event = ProbeEvent::from_transition("workspace-1", "wsagent", Transition::BecameReady);
        b.iter(|| {
            let json = serde_json::to_string(black_box(&event)).unwrap();
            black_box(json)
        });
    });
}

criterion_group!(benches, aggregator_benchmark, event_serialization_benchmark);
criterion_main!(benches);
