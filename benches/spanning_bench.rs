use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use darkstar_query::registry::directory::MasterDirectory;
use std::net::{Ipv4Addr, SocketAddrV4};

fn listing(count: u32) -> Vec<SocketAddrV4> {
    let mut servers: Vec<SocketAddrV4> = (0..count)
        .map(|i| SocketAddrV4::new(Ipv4Addr::from(0x0A00_0000 + i), 29001))
        .collect();
    servers.sort_by_key(|a| a.to_string());
    servers
}

#[allow(clippy::unwrap_used)]
fn bench_generate_and_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("spanning");
    let dir = MasterDirectory::new(
        "Benchmark Master",
        "Welcome to a benchmarking master server",
        99,
    );

    for &count in &[57u32, 500, 5000] {
        let servers = listing(count);
        group.throughput(Throughput::Elements(u64::from(count)));

        group.bench_with_input(BenchmarkId::new("generate", count), &servers, |b, servers| {
            b.iter(|| dir.generate_packets(servers, 0x0101, 512, |ip| ip))
        });

        let packets = dir.generate_packets(&servers, 0x0101, 512, |ip| ip);
        group.bench_with_input(BenchmarkId::new("merge", count), &packets, |b, packets| {
            b.iter(|| {
                let mut merged = MasterDirectory::default();
                for packet in packets {
                    merged.merge_packet(packet, true).unwrap();
                }
                merged
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_generate_and_merge);
criterion_main!(benches);
