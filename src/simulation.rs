//! Simulation - concurrent random order flow against one exchange.
//!
//! Each worker owns a seeded `ChaCha8Rng`, submits its share of orders,
//! and calls `match_all` every `match_every` submissions. Add latency is
//! recorded per worker in an HDR histogram and merged at the end.

use std::fmt;
use std::ops::RangeInclusive;
use std::thread;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;

use crate::command::Side;
use crate::error::SimulationError;
use crate::event_log::EventSink;
use crate::exchange::Exchange;
use crate::price;

/// Tickers used when none are given
pub const DEFAULT_SYMBOLS: [&str; 10] = [
    "AAPL", "GOOG", "TSLA", "MSFT", "AMZN", "META", "NFLX", "NVDA", "PYPL", "INTC",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Total orders across all workers
    pub order_count: usize,
    pub worker_count: usize,
    pub symbols: Vec<String>,
    /// Prices in ticks
    pub price_range: RangeInclusive<u64>,
    pub quantity_range: RangeInclusive<u32>,
    /// Submissions between `match_all` calls (0 = never during the run)
    pub match_every: usize,
    pub seed: u64,
    /// Pin worker `i` to core `i % cores`
    pub pin_cores: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            order_count: 1000,
            worker_count: 8,
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            price_range: 5_000..=50_000,
            quantity_range: 1..=100,
            match_every: 1,
            seed: 42,
            pin_cores: false,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.worker_count == 0 {
            return Err(SimulationError::NoWorkers);
        }
        if self.symbols.is_empty() {
            return Err(SimulationError::NoSymbols);
        }
        if self.price_range.is_empty() || *self.price_range.start() == 0 {
            return Err(SimulationError::EmptyRange("price"));
        }
        if self.quantity_range.is_empty() || *self.quantity_range.start() == 0 {
            return Err(SimulationError::EmptyRange("quantity"));
        }
        Ok(())
    }

    /// Orders handled by `worker`; the remainder goes to the first workers.
    fn share(&self, worker: usize) -> usize {
        let base = self.order_count / self.worker_count;
        base + usize::from(worker < self.order_count % self.worker_count)
    }
}

/// Remaining depth of one symbol after the run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SymbolDepth {
    pub bids: usize,
    pub asks: usize,
    pub best_bid: Option<u64>,
    pub best_ask: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub submitted: u64,
    pub added: u64,
    pub insert_failures: u64,
    pub trades: u64,
    pub elapsed: Duration,
    /// Successful adds per second
    pub throughput: f64,
    pub p50_ns: u64,
    pub p99_ns: u64,
    pub max_ns: u64,
    pub depth: FxHashMap<String, SymbolDepth>,
}

#[derive(Default)]
struct WorkerTally {
    submitted: u64,
    added: u64,
    failures: u64,
    trades: u64,
}

/// Run the configured flow against `exchange` and report.
pub fn run<S: EventSink>(exchange: &Exchange<S>, config: &SimulationConfig) -> Result<SimulationReport, SimulationError> {
    config.validate()?;
    let cores = if config.pin_cores {
        core_affinity::get_core_ids().unwrap_or_default()
    } else {
        Vec::new()
    };
    log::info!(
        "simulating {} orders on {} workers over {} symbols",
        config.order_count,
        config.worker_count,
        config.symbols.len()
    );

    let start = Instant::now();
    let results: Vec<Result<(WorkerTally, Histogram<u64>), SimulationError>> = thread::scope(|s| {
        let handles: Vec<_> = (0..config.worker_count)
            .map(|worker| {
                let core = (!cores.is_empty()).then(|| cores[worker % cores.len()]);
                s.spawn(move || {
                    if let Some(core) = core {
                        if !core_affinity::set_for_current(core) {
                            log::warn!("worker {} could not be pinned to core {}", worker, core.id);
                        }
                    }
                    run_worker(exchange, config, worker)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    let mut latency = Histogram::<u64>::new_with_bounds(1, 60_000_000_000, 3)?;
    let mut total = WorkerTally::default();
    for result in results {
        let (tally, histogram) = result?;
        latency.add(&histogram)?;
        total.submitted += tally.submitted;
        total.added += tally.added;
        total.failures += tally.failures;
        total.trades += tally.trades;
    }
    total.trades += exchange.match_all() as u64;
    let elapsed = start.elapsed();

    let depth = exchange
        .index()
        .iter()
        .map(|node| {
            let depth = SymbolDepth {
                bids: node.bids.len(),
                asks: node.asks.len(),
                best_bid: node.bids.best().map(|o| o.price),
                best_ask: node.asks.best().map(|o| o.price),
            };
            (node.symbol().to_string(), depth)
        })
        .collect();

    Ok(SimulationReport {
        submitted: total.submitted,
        added: total.added,
        insert_failures: total.failures,
        trades: total.trades,
        elapsed,
        throughput: total.added as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        p50_ns: latency.value_at_quantile(0.50),
        p99_ns: latency.value_at_quantile(0.99),
        max_ns: latency.max(),
        depth,
    })
}

fn run_worker<S: EventSink>(
    exchange: &Exchange<S>,
    config: &SimulationConfig,
    worker: usize,
) -> Result<(WorkerTally, Histogram<u64>), SimulationError> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(worker as u64));
    let mut histogram = Histogram::<u64>::new_with_bounds(1, 60_000_000_000, 3)?;
    let mut tally = WorkerTally::default();

    for i in 0..config.share(worker) {
        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        let symbol = &config.symbols[rng.gen_range(0..config.symbols.len())];
        let quantity = rng.gen_range(config.quantity_range.clone());
        let price = rng.gen_range(config.price_range.clone());

        let begin = Instant::now();
        let outcome = exchange.add_order(side, symbol, quantity, price);
        histogram.saturating_record(begin.elapsed().as_nanos() as u64);

        tally.submitted += 1;
        match outcome {
            Ok(_) => tally.added += 1,
            Err(err) => {
                log::warn!("worker {}: {}", worker, err);
                tally.failures += 1;
            }
        }
        if config.match_every > 0 && (i + 1) % config.match_every == 0 {
            tally.trades += exchange.match_all() as u64;
        }
    }
    Ok((tally, histogram))
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Report ===")?;
        writeln!(f, "Submitted:       {}", self.submitted)?;
        writeln!(f, "Added:           {}", self.added)?;
        writeln!(f, "Insert failures: {}", self.insert_failures)?;
        writeln!(f, "Trades:          {}", self.trades)?;
        writeln!(f, "Elapsed:         {:.3?}", self.elapsed)?;
        writeln!(f, "Throughput:      {:.2} orders/sec", self.throughput)?;
        writeln!(f, "---------------------------")?;
        writeln!(f, "Add P50:  {:8} ns", self.p50_ns)?;
        writeln!(f, "Add P99:  {:8} ns", self.p99_ns)?;
        writeln!(f, "Add Max:  {:8} ns", self.max_ns)?;
        writeln!(f, "---------------------------")?;

        let mut symbols: Vec<_> = self.depth.iter().collect();
        symbols.sort_by(|a, b| a.0.cmp(b.0));
        for (symbol, depth) in symbols {
            let quote = |p: Option<u64>| p.map(price::format_ticks).unwrap_or_else(|| "-".into());
            writeln!(
                f,
                "{:6} bids {:4} asks {:4}  best {} / {}",
                symbol,
                depth.bids,
                depth.asks,
                quote(depth.best_bid),
                quote(depth.best_ask)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(seed: u64) -> SimulationConfig {
        SimulationConfig {
            order_count: 400,
            worker_count: 4,
            seed,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_share_splits_remainder() {
        let config = SimulationConfig {
            order_count: 10,
            worker_count: 4,
            ..SimulationConfig::default()
        };
        let shares: Vec<usize> = (0..4).map(|w| config.share(w)).collect();
        assert_eq!(shares, vec![3, 3, 2, 2]);
    }

    #[test]
    fn test_validate() {
        assert!(SimulationConfig::default().validate().is_ok());
        let config = SimulationConfig {
            worker_count: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimulationError::NoWorkers)));
        let config = SimulationConfig {
            price_range: 0..=10,
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimulationError::EmptyRange("price"))));
    }

    #[test]
    fn test_run_accounts_for_every_order() {
        let exchange = Exchange::new();
        let report = run(&exchange, &small(7)).unwrap();
        assert_eq!(report.submitted, 400);
        assert_eq!(report.added + report.insert_failures, 400);
        assert_eq!(report.trades, exchange.stats().trades_executed);
        assert!(report.depth.len() <= DEFAULT_SYMBOLS.len());
        assert!(report.p50_ns <= report.max_ns);
    }

    #[test]
    fn test_books_do_not_cross_after_run() {
        let exchange = Exchange::new();
        let report = run(&exchange, &small(11)).unwrap();
        for (symbol, depth) in &report.depth {
            if let (Some(bid), Some(ask)) = (depth.best_bid, depth.best_ask) {
                assert!(bid < ask, "{symbol} crossed: {bid} >= {ask}");
            }
        }
        assert!(report.to_string().contains("Simulation Report"));
    }
}
