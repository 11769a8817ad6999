//! Benchmark for initiator delta computation and host planning
//!
//! Hosts in large FC fabrics carry hundreds of WWPNs; the delta must stay
//! linear in the number of ports.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use storage_grid_reconciler::domain::model::Host;
use storage_grid_reconciler::domain::ports::Lookup;
use storage_grid_reconciler::reconcile::comparator::compare_host;
use storage_grid_reconciler::reconcile::initiators::InitiatorDelta;
use storage_grid_reconciler::reconcile::planner::plan_host;
use storage_grid_reconciler::reconcile::{HostRequest, HostTarget, TargetState};

fn ports(prefix: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("iqn.2024-01.io.grid:{}-{:05}", prefix, i))
        .collect()
}

fn bench_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("initiator_delta");

    for size in [8usize, 128, 1024] {
        let current = ports("host", size);
        // Half overlap with the current set
        let mut desired = ports("host", size / 2);
        desired.extend(ports("new", size / 2));

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("missing", size), &size, |b, _| {
            b.iter(|| InitiatorDelta::missing(black_box(&desired), black_box(&current)))
        });
        group.bench_with_input(BenchmarkId::new("present", size), &size, |b, _| {
            b.iter(|| InitiatorDelta::present(black_box(&desired), black_box(&current)))
        });
    }

    group.finish();
}

fn bench_plan_host(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_host");

    let host = Lookup::Found(Host {
        name: "h1".into(),
        description: None,
        initiators: ports("host", 256),
    });
    let mut desired = ports("host", 128);
    desired.extend(ports("new", 128));
    let request = HostRequest {
        host: Some("h1".into()),
        initiators: desired,
        ..Default::default()
    };
    let target = HostTarget::Host("h1".into());

    group.throughput(Throughput::Elements(1));
    group.bench_function("partial_match_256", |b| {
        b.iter(|| {
            let existing = compare_host(&request.initiators, black_box(&host), TargetState::Present);
            plan_host(black_box(&request), &target, &existing, None)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_delta, bench_plan_host);
criterion_main!(benches);
