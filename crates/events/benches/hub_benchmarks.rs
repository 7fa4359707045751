use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use athanor_events::EventHub;

fn bench_broadcast_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_fanout");
    group.throughput(Throughput::Elements(1));

    for subscriber_count in [0usize, 1, 8, 64].iter() {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscriber_count),
            subscriber_count,
            |b, &count| {
                let hub = EventHub::new();
                let subs: Vec<_> = (0..count).map(|_| hub.subscribe()).collect();
                let payload = serde_json::json!({
                    "id": 7,
                    "status": "PROCESSING",
                    "result": "Processing started at 2025-01-01T00:00:00Z",
                });

                b.iter(|| {
                    hub.broadcast("transmutation.updated", black_box(&payload));
                    // Drain so mailboxes never saturate and we measure
                    // the send path, not the drop path.
                    for sub in &subs {
                        while sub.try_recv().is_ok() {}
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_broadcast_drop_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_drop_path");
    group.sample_size(1000);

    group.bench_function("full_mailbox", |b| {
        let hub = EventHub::new();
        let _sub = hub.subscribe();
        let payload = serde_json::json!({"id": 7});
        for _ in 0..athanor_events::MAILBOX_CAPACITY {
            hub.broadcast("transmutation.updated", &payload);
        }

        b.iter(|| {
            hub.broadcast("transmutation.updated", black_box(&payload));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_broadcast_fanout, bench_broadcast_drop_path);
criterion_main!(benches);
