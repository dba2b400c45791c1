//! Replay - feed recorded orders from CSV into an exchange.
//!
//! Expected columns: `side,symbol,quantity,price`, with decimal prices
//! (`150.25`) that are converted to ticks.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::command::{PlaceOrder, Side};
use crate::error::ReplayError;
use crate::event_log::EventSink;
use crate::exchange::Exchange;
use crate::price;

/// One raw CSV row
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRow {
    pub side: String,
    pub symbol: String,
    pub quantity: u32,
    pub price: String,
}

impl OrderRow {
    /// Convert to a typed command; `row` is only used in errors.
    pub fn to_command(&self, row: usize) -> Result<PlaceOrder, ReplayError> {
        let side = Side::from_str(&self.side).map_err(|source| ReplayError::Side { row, source })?;
        let price = Decimal::from_str(self.price.trim())
            .ok()
            .and_then(price::to_ticks)
            .ok_or_else(|| ReplayError::Price {
                row,
                text: self.price.clone(),
            })?;
        Ok(PlaceOrder {
            side,
            symbol: self.symbol.trim().to_string(),
            quantity: self.quantity,
            price,
        })
    }
}

/// Parse every row of a CSV document with a header line.
pub fn read<R: Read>(reader: R) -> Result<Vec<PlaceOrder>, ReplayError> {
    let mut rows = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut orders = Vec::new();
    for (row, record) in rows.deserialize::<OrderRow>().enumerate() {
        orders.push(record?.to_command(row + 1)?);
    }
    Ok(orders)
}

/// Read orders from a CSV file.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<PlaceOrder>, ReplayError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    let orders = read(file)?;
    log::info!("loaded {} orders from {}", orders.len(), path.display());
    Ok(orders)
}

/// Totals of one replay
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub submitted: usize,
    pub added: usize,
    pub rejected: usize,
    pub trades: usize,
}

/// Submit `orders` in sequence, matching after every `match_every`
/// submissions (0 = only once at the end) and once more at the end.
pub fn run<S: EventSink>(exchange: &Exchange<S>, orders: &[PlaceOrder], match_every: usize) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for (i, order) in orders.iter().enumerate() {
        summary.submitted += 1;
        match exchange.place(order) {
            Ok(_) => summary.added += 1,
            Err(err) => {
                log::warn!("order {} ({} {}) rejected: {}", i + 1, order.side, order.symbol, err);
                summary.rejected += 1;
            }
        }
        if match_every > 0 && (i + 1) % match_every == 0 {
            summary.trades += exchange.match_all();
        }
    }
    summary.trades += exchange.match_all();
    summary
}
