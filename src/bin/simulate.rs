use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use lockfree_exchange::simulation::{self, DEFAULT_SYMBOLS};
use lockfree_exchange::{EngineConfig, EventLog, Exchange, SimulationConfig};

/// Drive random concurrent order flow through the exchange.
#[derive(Debug, Parser)]
#[command(name = "simulate", version)]
struct Args {
    /// Total orders across all workers
    #[arg(long, default_value_t = 1000)]
    orders: usize,

    /// Concurrent submitting threads
    #[arg(long, default_value_t = 8)]
    workers: usize,

    /// Comma-separated tickers
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Lowest price in ticks
    #[arg(long, default_value_t = 5_000)]
    min_price: u64,

    /// Highest price in ticks
    #[arg(long, default_value_t = 50_000)]
    max_price: u64,

    #[arg(long, default_value_t = 1)]
    min_quantity: u32,

    #[arg(long, default_value_t = 100)]
    max_quantity: u32,

    /// Run match_all after this many submissions per worker (0 = only at the end)
    #[arg(long, default_value_t = 1)]
    match_every: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Pin each worker to a CPU core
    #[arg(long)]
    pin_cores: bool,

    /// Engine config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn simulation(&self) -> Result<SimulationConfig> {
        ensure!(self.min_price <= self.max_price, "--min-price exceeds --max-price");
        ensure!(
            self.min_quantity <= self.max_quantity,
            "--min-quantity exceeds --max-quantity"
        );
        let symbols = if self.symbols.is_empty() {
            DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
        } else {
            self.symbols.clone()
        };
        Ok(SimulationConfig {
            order_count: self.orders,
            worker_count: self.workers,
            symbols,
            price_range: self.min_price..=self.max_price,
            quantity_range: self.min_quantity..=self.max_quantity,
            match_every: self.match_every,
            seed: self.seed,
            pin_cores: self.pin_cores,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let engine = match &args.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::default(),
    };
    let config = args.simulation()?;

    let (sender, log_task) = EventLog::spawn();
    let exchange = Arc::new(Exchange::with_config(&engine, sender));

    let report = {
        let exchange = exchange.clone();
        tokio::task::spawn_blocking(move || simulation::run(&*exchange, &config))
            .await
            .context("simulation thread panicked")??
    };

    let stats = exchange.stats();
    // Last sender goes with the exchange; the log task then drains and exits
    drop(exchange);
    let written = log_task.await.context("event log task failed")?;

    println!("{}", report);
    println!(
        "Events logged: {} (orders {}, trades {})",
        written, stats.orders_added, stats.trades_executed
    );
    Ok(())
}
