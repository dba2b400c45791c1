use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lockfree_exchange::{replay, EngineConfig, EventLog, Exchange};

/// Replay a CSV of orders (side,symbol,quantity,price) through the exchange.
#[derive(Debug, Parser)]
#[command(name = "replay", version)]
struct Args {
    /// Order file
    input: PathBuf,

    /// Engine config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run match_all after this many orders (0 = only at the end)
    #[arg(long, default_value_t = 1)]
    match_every: usize,

    /// Print the final book of each symbol
    #[arg(long)]
    books: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let engine = match &args.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::default(),
    };
    let orders = replay::load(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let (sender, log_task) = EventLog::spawn();
    let exchange = Exchange::with_config(&engine, sender);
    let summary = replay::run(&exchange, &orders, args.match_every);

    if args.books {
        let mut symbols: Vec<String> = exchange
            .index()
            .iter()
            .map(|node| node.symbol().to_string())
            .collect();
        symbols.sort();
        for symbol in symbols {
            if let Some(book) = exchange.book(&symbol) {
                println!("== {} ==\n{}", symbol, book);
            }
        }
    }

    drop(exchange);
    let written = log_task.await.context("event log task failed")?;

    println!(
        "Submitted {} | added {} | rejected {} | trades {} | events {}",
        summary.submitted, summary.added, summary.rejected, summary.trades, written
    );
    Ok(())
}
