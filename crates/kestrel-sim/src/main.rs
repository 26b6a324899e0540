//! Kestrel Sim - multi-threaded load driver for the matching core.
//!
//! Spawns worker threads that fire random limit orders at one shared engine,
//! measures per-submit latency, and audits quantity conservation per
//! instrument once every worker has finished.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use kestrel_core::{
    EngineConfig, MatchEvent, MatchSink, MatchingEngine, Price, Quantity, Side, Symbol,
    TracingSink,
};
use kestrel_metrics::{LatencyHistogram, Stopwatch};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kestrel-sim", about = "Concurrent load driver for the Kestrel matching core")]
struct Args {
    /// Worker threads.
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Orders submitted by each worker (the upper bound with `--random-orders`).
    #[arg(long, default_value_t = 1000)]
    orders: usize,

    /// Give each worker a random order count in `1..=--orders`.
    #[arg(long)]
    random_orders: bool,

    /// Comma-separated instrument tickers.
    #[arg(long, value_delimiter = ',', default_value = "AAPL,GOOG,TSLA,AMZN,MSFT")]
    symbols: Vec<String>,

    /// Base RNG seed; worker `t` uses `seed + t`. Random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Instrument table size (power of two).
    #[arg(long, default_value_t = kestrel_core::DEFAULT_BUCKETS)]
    buckets: usize,

    /// Lowest limit price, in whole units.
    #[arg(long, default_value_t = 100)]
    min_price: u64,

    /// Highest limit price, in whole units.
    #[arg(long, default_value_t = 150)]
    max_price: u64,

    /// Largest order quantity.
    #[arg(long, default_value_t = 100)]
    max_qty: u64,

    /// Log every match at info level.
    #[arg(long)]
    log_matches: bool,

    /// Pin each worker to its own core.
    #[arg(long)]
    pin_cores: bool,
}

/// Counts matched quantity per instrument and optionally logs each match.
struct AuditSink {
    symbols: Vec<Symbol>,
    matched: Vec<AtomicU64>,
    log: bool,
}

impl AuditSink {
    fn new(symbols: &[Symbol], log: bool) -> Self {
        Self {
            symbols: symbols.to_vec(),
            matched: symbols.iter().map(|_| AtomicU64::new(0)).collect(),
            log,
        }
    }

    fn matched(&self, i: usize) -> u64 {
        self.matched[i].load(Ordering::Relaxed)
    }
}

impl MatchSink for AuditSink {
    fn on_match(&self, event: &MatchEvent) {
        if let Some(i) = self.symbols.iter().position(|s| *s == event.symbol) {
            self.matched[i].fetch_add(event.quantity.0, Ordering::Relaxed);
        }
        if self.log {
            TracingSink.on_match(event);
        }
    }
}

/// Conservation check for every group of instruments sharing one bucket.
///
/// `resting` is the bucket's total resting quantity over both sides; every
/// matched share left one bid and one ask.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BucketAudit {
    symbols: Vec<Symbol>,
    submitted: u64,
    matched: u64,
    resting: u64,
}

impl BucketAudit {
    fn balanced(&self) -> bool {
        self.resting + 2 * self.matched == self.submitted
    }
}

fn audit<S: MatchSink>(
    engine: &MatchingEngine<S>,
    symbols: &[Symbol],
    submitted: &[u64],
    matched: &[u64],
) -> Vec<BucketAudit> {
    let mut by_bucket: BTreeMap<usize, BucketAudit> = BTreeMap::new();
    for (i, &symbol) in symbols.iter().enumerate() {
        let entry = by_bucket.entry(engine.bucket_index(symbol)).or_insert_with(|| BucketAudit {
            symbols: Vec::new(),
            submitted: 0,
            matched: 0,
            resting: engine.resting_quantity(symbol, Side::Buy).0
                + engine.resting_quantity(symbol, Side::Sell).0,
        });
        entry.symbols.push(symbol);
        entry.submitted += submitted[i];
        entry.matched += matched[i];
    }
    by_bucket.into_values().collect()
}

fn parse_symbols(tickers: &[String]) -> Result<Vec<Symbol>> {
    let mut symbols = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        let symbol = Symbol::new(ticker.trim()).with_context(|| format!("bad symbol {ticker:?}"))?;
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    ensure!(!symbols.is_empty(), "at least one symbol is required");
    Ok(symbols)
}

/// Orders one worker submits: fixed, or uniform in `1..=max` when randomised.
fn order_count(rng: &mut impl Rng, max: usize, randomised: bool) -> usize {
    if randomised && max > 0 {
        rng.gen_range(1..=max)
    } else {
        max
    }
}

struct Worker<'a, S: MatchSink> {
    engine: &'a MatchingEngine<S>,
    symbols: &'a [Symbol],
    submitted: &'a [AtomicU64],
    args: &'a Args,
}

impl<S: MatchSink> Worker<'_, S> {
    fn run(&self, worker: usize, seed: u64) -> LatencyHistogram {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let orders = order_count(&mut rng, self.args.orders, self.args.random_orders);
        let watch = Stopwatch::new();
        let mut latency = LatencyHistogram::new();
        let (lo, hi) = (
            Price::from_units(self.args.min_price).as_raw(),
            Price::from_units(self.args.max_price).as_raw(),
        );

        debug!(worker, orders, "worker starting");
        for _ in 0..orders {
            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let which = rng.gen_range(0..self.symbols.len());
            let qty = rng.gen_range(1..=self.args.max_qty);
            let price = Price::from_raw(rng.gen_range(lo..=hi));
            let symbol = self.symbols[which];
            debug!(worker, %side, %symbol, quantity = qty, %price, "placing order");

            watch.record(&mut latency, || {
                self.engine.submit(side, symbol, Quantity(qty), price)
            });
            self.submitted[which].fetch_add(qty, Ordering::Relaxed);
        }
        latency
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    ensure!(args.threads > 0, "--threads must be at least 1");
    ensure!(args.max_qty > 0, "--max-qty must be at least 1");
    ensure!(
        args.min_price > 0 && args.min_price <= args.max_price,
        "price range {}..={} is empty or includes zero",
        args.min_price,
        args.max_price
    );

    let symbols = parse_symbols(&args.symbols)?;
    let config = EngineConfig::with_buckets(args.buckets)?;
    let seed = args.seed.unwrap_or_else(rand::random);

    let engine = MatchingEngine::with_config(config, AuditSink::new(&symbols, args.log_matches));
    let submitted: Vec<AtomicU64> = symbols.iter().map(|_| AtomicU64::new(0)).collect();

    let cores = if args.pin_cores {
        let ids = core_affinity::get_core_ids().unwrap_or_default();
        if ids.is_empty() {
            warn!("core pinning requested but no core ids are available");
        }
        ids
    } else {
        Vec::new()
    };

    info!(
        threads = args.threads,
        orders = args.orders,
        random_orders = args.random_orders,
        symbols = symbols.len(),
        buckets = engine.buckets(),
        seed,
        "starting load"
    );

    let start = Instant::now();
    let histograms: Vec<LatencyHistogram> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..args.threads)
            .map(|t| {
                let worker = Worker {
                    engine: &engine,
                    symbols: &symbols,
                    submitted: &submitted,
                    args: &args,
                };
                let core = (!cores.is_empty()).then(|| cores[t % cores.len()]);
                s.spawn(move || {
                    if let Some(core) = core {
                        if !core_affinity::set_for_current(core) {
                            warn!(thread = t, "failed to pin worker");
                        }
                    }
                    worker.run(t, seed.wrapping_add(t as u64))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect::<Result<_, _>>()
    })
    .map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    let elapsed = start.elapsed();

    let mut latency = LatencyHistogram::new();
    for h in &histograms {
        latency.merge(h);
    }

    let stats = engine.stats();
    let total = stats.orders as f64;

    println!();
    println!("Orders:        {:>12}", stats.orders);
    println!("Elapsed:       {:>12.2?}", elapsed);
    println!("Throughput:    {:>12.0} orders/sec", total / elapsed.as_secs_f64());
    println!("Submit latency (n={}, mean {:.0} ns)", latency.count(), latency.mean());
    println!("{}", latency.summary("  "));
    println!();
    println!("Matches:       {:>12}", stats.matches);
    println!("Matched qty:   {:>12}", stats.matched_quantity);
    println!("Insert retry:  {:>12}", stats.insert_retries);
    println!("Cross retry:   {:>12}", stats.cross_retries);
    println!("Rollbacks:     {:>12}", stats.rollbacks);
    println!("Repairs:       {:>12}", stats.rollback_repairs);
    println!("Re-homed:      {:>12}", stats.rehomed);
    println!("Unlinks:       {:>12}", stats.unlinks);
    println!("Nodes:         {:>12}", engine.orders_allocated());
    println!();

    let submitted: Vec<u64> = submitted.iter().map(|s| s.load(Ordering::Relaxed)).collect();
    let matched: Vec<u64> = (0..symbols.len()).map(|i| engine.sink().matched(i)).collect();

    let mut failures = 0;
    for bucket in audit(&engine, &symbols, &submitted, &matched) {
        let names: Vec<&str> = bucket.symbols.iter().map(Symbol::as_str).collect();
        let verdict = if bucket.balanced() { "ok" } else { "MISMATCH" };
        println!(
            "{:<16} submitted {:>10}  matched {:>10}  resting {:>10}  {}",
            names.join("/"),
            bucket.submitted,
            bucket.matched,
            bucket.resting,
            verdict
        );
        if !bucket.balanced() {
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} bucket(s) failed the conservation audit");
    }
    Ok(())
}
