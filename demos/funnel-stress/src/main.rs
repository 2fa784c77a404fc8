use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use argh::FromArgs;
use bytesize::ByteSize;
use funnel::{Entry, ValueQueue};

#[derive(Debug, FromArgs)]
/// Stress a funnel queue with many producers and one consumer
#[argh(help_triggers("--help"))]
struct Args {
    /// number of producer threads
    #[argh(option, default = "1000")]
    producers: usize,
    /// number of values pushed by each producer
    #[argh(option, default = "1000")]
    count: usize,
    /// drain while producers are still running
    #[argh(switch)]
    concurrent: bool,
    /// let producers randomly yield between pushes
    #[argh(switch)]
    jitter: bool,
    /// hand popped entries back to producers for reuse
    #[argh(switch)]
    recycle: bool,
}

/// A value tagged with its producer and per-producer sequence number.
#[derive(Clone, Copy, Debug)]
struct Token {
    producer: usize,
    seq: usize,
}

struct Report {
    received: usize,
    transitions: usize,
    recycled: usize,
}

pub fn main() -> Result<()> {
    let args = argh::from_env::<Args>();
    tracing_subscriber::fmt()
        .with_thread_names(true)
        .without_time()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if args.producers == 0 || args.count == 0 {
        bail!("producers and count must not be zero");
    }
    let total = args
        .producers
        .checked_mul(args.count)
        .ok_or_else(|| anyhow!("{} producers x {} values overflows", args.producers, args.count))?;
    let footprint = ByteSize::b(total.saturating_mul(size_of::<Entry<Token>>()) as u64);
    tracing::info!(
        "started stress, producers={}, count={}, concurrent={}, jitter={}, recycle={}, footprint={}",
        args.producers,
        args.count,
        args.concurrent,
        args.jitter,
        args.recycle,
        footprint.display().iec_short(),
    );

    let now = Instant::now();
    let report = run(&args, total)?;
    let elapsed = now.elapsed();

    tracing::info!(
        "finished stress, received={}, transitions={}, recycled={}, elapsed={}ms",
        report.received,
        report.transitions,
        report.recycled,
        elapsed.as_millis(),
    );
    Ok(())
}

fn run(args: &Args, total: usize) -> Result<Report> {
    let q = ValueQueue::<Token>::new();
    let pool = ValueQueue::<Token>::new();
    let finished = AtomicUsize::new(0);
    let transitions = AtomicUsize::new(0);
    let recycled = AtomicUsize::new(0);

    let mut checker = Checker::new(args.producers, total);
    std::thread::scope(|cx| -> Result<()> {
        for producer in 0..args.producers {
            let (q, pool, finished, transitions, recycled) =
                (&q, &pool, &finished, &transitions, &recycled);
            cx.spawn(move || {
                for seq in 0..args.count {
                    let token = Token { producer, seq };
                    let entry = match args.recycle.then(|| pool.try_consume()).flatten() {
                        Some(mut pool) => match pool.pop() {
                            Some(mut entry) => {
                                entry.replace(token);
                                recycled.fetch_add(1, Ordering::Relaxed);
                                entry
                            },
                            None => Entry::new(token),
                        },
                        None => Entry::new(token),
                    };
                    if q.push(entry) {
                        transitions.fetch_add(1, Ordering::Relaxed);
                    }
                    if args.jitter && fastrand::u8(..) < 16 {
                        std::thread::yield_now();
                    }
                }
                finished.fetch_add(1, Ordering::Release);
            });
        }

        if !args.concurrent {
            while finished.load(Ordering::Acquire) < args.producers {
                std::thread::yield_now();
            }
            tracing::info!("producers finished, draining");
        }

        let mut rx = q.consume();
        loop {
            let done = finished.load(Ordering::Acquire) == args.producers;
            while let Some(entry) = rx.pop() {
                checker.observe(*entry.value())?;
                if args.recycle {
                    pool.push(entry);
                }
            }
            if done {
                break;
            }
            std::thread::yield_now();
        }
        Ok(())
    })?;

    checker.finish()?;
    Ok(Report {
        received: checker.received,
        transitions: transitions.into_inner(),
        recycled: recycled.into_inner(),
    })
}

/// Verifies that every value is received once, in per-producer order.
struct Checker {
    next_seq: Vec<usize>,
    received: usize,
    total: usize,
}

impl Checker {
    fn new(producers: usize, total: usize) -> Self {
        Self {
            next_seq: vec![0; producers],
            received: 0,
            total,
        }
    }

    fn observe(&mut self, token: Token) -> Result<()> {
        let Token { producer, seq } = token;
        let expected = self
            .next_seq
            .get_mut(producer)
            .ok_or_else(|| anyhow!("unknown producer, token={token:?}"))?;
        if seq != *expected {
            bail!("out of order value, token={token:?}, expected_seq={expected}");
        }
        *expected += 1;
        self.received += 1;
        if self.received % (self.total / 10).max(1) == 0 {
            tracing::debug!("received {}/{}", self.received, self.total);
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        if self.received != self.total {
            bail!("lost values, received={}, expected={}", self.received, self.total);
        }
        Ok(())
    }
}
