//! Matching engine benchmarks.
//!
//! Run with: cargo bench -p kestrel-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kestrel_core::{MatchingEngine, NullSink, Price, Quantity, Side, Symbol};

fn aapl() -> Symbol {
    Symbol::new("AAPL").unwrap()
}

/// Benchmark inserting behind a deep resting book.
fn bench_insert_deep_book(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_deep_book");
    group.throughput(Throughput::Elements(1));

    for depth in [10u64, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter_batched(
                || {
                    let engine = MatchingEngine::new();
                    for i in 0..depth {
                        engine.submit_at(
                            Side::Sell,
                            aapl(),
                            Quantity(100),
                            Price::from_units(10_000 + i % 100),
                            i,
                        );
                    }
                    engine
                },
                |engine| {
                    // Worst price: walks the whole list, never crosses.
                    engine.submit_at(
                        Side::Sell,
                        aapl(),
                        Quantity(100),
                        Price::from_units(20_000),
                        depth,
                    );
                    black_box(engine)
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

/// Benchmark a single crossing.
fn bench_match_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_single");
    group.throughput(Throughput::Elements(1));

    group.bench_function("full_fill", |b| {
        b.iter_batched(
            || {
                let engine = MatchingEngine::new();
                engine.submit_at(Side::Sell, aapl(), Quantity(100), Price::from_units(100), 0);
                engine
            },
            |engine| {
                engine.submit_at(Side::Buy, aapl(), Quantity(100), Price::from_units(100), 1);
                black_box(engine)
            },
            criterion::BatchSize::SmallInput,
        )
    });

    group.finish();
}

/// Benchmark one order sweeping several resting asks.
fn bench_match_multiple(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_multiple");
    group.throughput(Throughput::Elements(1));

    for count in [1u64, 5, 10] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let engine = MatchingEngine::new();
                    for i in 0..count {
                        engine.submit_at(Side::Sell, aapl(), Quantity(10), Price::from_units(100), i);
                    }
                    engine
                },
                |engine| {
                    engine.submit_at(
                        Side::Buy,
                        aapl(),
                        Quantity(10 * count),
                        Price::from_units(100),
                        count,
                    );
                    black_box(engine)
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

/// Benchmark concurrent submission across threads.
fn bench_concurrent_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_submit");
    const PER_THREAD: u64 = 2_000;

    for threads in [1u64, 2, 4] {
        group.throughput(Throughput::Elements(threads * PER_THREAD));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let engine: MatchingEngine<NullSink> = MatchingEngine::new();
                std::thread::scope(|s| {
                    for t in 0..threads {
                        let engine = &engine;
                        s.spawn(move || {
                            for i in 0..PER_THREAD {
                                let side = if (i + t) % 2 == 0 { Side::Buy } else { Side::Sell };
                                let price = Price::from_units(10_000 + (i % 10));
                                engine.submit(side, aapl(), Quantity(100), price);
                            }
                        });
                    }
                });
                black_box(engine.stats())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_deep_book,
    bench_match_single,
    bench_match_multiple,
    bench_concurrent_submit,
);

criterion_main!(benches);
