use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use pour_core::{Broadcast, Event, WeightSample};

fn sample(i: u64) -> Event {
    Event::Weight(WeightSample {
        grams: (i % 500) as f32 * 0.1,
        at_ms: i,
    })
}

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_publish");

    for subs in [1usize, 4, 16] {
        group.bench_function(format!("drained/{subs}"), |b| {
            let hub = Broadcast::new(64);
            let rxs: Vec<_> = (0..subs).map(|_| hub.subscribe()).collect();
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                black_box(hub.publish(sample(i)));
                for rx in &rxs {
                    while rx.try_recv().is_ok() {}
                }
            });
        });
    }

    // Every subscriber full: publish only counts drops.
    group.bench_function("saturated/4", |b| {
        b.iter_batched(
            || {
                let hub = Broadcast::new(1);
                let rxs: Vec<_> = (0..4).map(|_| hub.subscribe()).collect();
                hub.publish(sample(0));
                (hub, rxs)
            },
            |(hub, _rxs)| {
                for i in 0..64 {
                    black_box(hub.publish(sample(i)));
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_publish);
criterion_main!(benches);
