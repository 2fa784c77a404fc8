use std::sync::Barrier;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use criterion::{Criterion, criterion_group, criterion_main};
use funnel::ValueQueue;

const PRODUCERS: &[usize] = &[1, 2, 4, 8];

fn bench_push_pop<const N: usize>(iters: usize, producers: usize) -> Duration {
    let q = ValueQueue::<[u8; N]>::new();
    let per_producer = iters.div_ceil(producers);
    let total = per_producer * producers;
    let start = Barrier::new(producers + 1);

    let mut elapsed = Duration::ZERO;
    std::thread::scope(|cx| {
        for _ in 0..producers {
            let (q, start) = (&q, &start);
            cx.spawn(move || {
                start.wait();
                for _ in 0..per_producer {
                    q.push_value([0; N]);
                }
            });
        }

        let mut rx = q.consume();
        start.wait();
        let now = Instant::now();
        let mut received = 0;
        while received < total {
            match rx.pop_value() {
                Some(v) => {
                    std::hint::black_box(v);
                    received += 1;
                },
                None => std::hint::spin_loop(),
            }
        }
        elapsed = now.elapsed();
    });
    elapsed
}

fn groups(c: &mut Criterion) {
    type BenchFn = fn(usize, usize) -> Duration;
    let mut g = c.benchmark_group("funnel");
    for (name, payload, f) in [
        ("small", 8, bench_push_pop::<8> as BenchFn),
        ("medium", 64, bench_push_pop::<64> as BenchFn),
        ("large", 512, bench_push_pop::<512> as BenchFn),
    ] {
        let psize = ByteSize::b(payload).display().iec_short();
        for producers in PRODUCERS.iter().copied() {
            let id = format!("push_pop_{name}_{psize:.0}_{producers:02}p");
            g.bench_function(&id, |b| {
                b.iter_custom(|iters| f(iters as usize, producers))
            });
        }
    }
}

criterion_group!(contention, groups);
criterion_main!(contention);
