use std::net::Ipv4Addr;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use sim_helper::emulated_time::EmulatedTime;
use sim_helper::simulation_time::SimulationTime;
use slp_sim::routing::dpd::DuplicatePacketDetection;

const SOURCES: u8 = 100;
const PACKETS_PER_SOURCE: u64 = 100;

fn at(ms: u64) -> EmulatedTime {
    EmulatedTime::SIMULATION_START + SimulationTime::from_millis(ms)
}

/// A detector that has seen every packet of every source.
fn filled() -> DuplicatePacketDetection {
    let mut dpd = DuplicatePacketDetection::new(SimulationTime::MINUTE);
    for id in 0..PACKETS_PER_SOURCE {
        for src in 0..SOURCES {
            dpd.is_duplicate(at(id), Ipv4Addr::new(10, 0, 0, src), id);
        }
    }
    dpd
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("duplicate detection");

    group.bench_function("new packet", |b| {
        let mut dpd = filled();
        let mut id = PACKETS_PER_SOURCE;
        b.iter(|| {
            id += 1;
            black_box(dpd.is_duplicate(at(1000), Ipv4Addr::new(10, 0, 0, 1), id))
        });
    });

    group.bench_function("duplicate", |b| {
        let mut dpd = filled();
        b.iter(|| black_box(dpd.is_duplicate(at(1000), Ipv4Addr::new(10, 0, 0, 1), 50)));
    });

    group.bench_function("purge all", |b| {
        b.iter_batched(
            filled,
            |mut dpd| {
                dpd.purge(at(3_600_000));
                dpd
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
