//! Command and Event types for the exchange.
//!
//! Commands are order submissions from drivers (simulation, replay).
//! Events are outputs to the event log.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::UnknownSide;
use crate::order::Order;
use crate::price;

/// Order side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("Buy"),
            Side::Sell => f.write_str("Sell"),
        }
    }
}

impl FromStr for Side {
    type Err = UnknownSide;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "bid" | "b" => Ok(Side::Buy),
            "sell" | "ask" | "s" => Ok(Side::Sell),
            _ => Err(UnknownSide(s.to_string())),
        }
    }
}

// ============================================================================
// Input Commands
// ============================================================================

/// Submit a new limit order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceOrder {
    /// Order side
    pub side: Side,
    /// Ticker symbol
    pub symbol: String,
    /// Order quantity
    pub quantity: u32,
    /// Fixed-point price in ticks (e.g., $150.25 -> 15025)
    pub price: u64,
}

// ============================================================================
// Output Events
// ============================================================================

/// Structured event emitted by the exchange core.
///
/// Every successful insertion yields one `OrderAdded`, every executed trade
/// one `TradeExecuted`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// An order was linked into its book
    OrderAdded {
        timestamp: DateTime<Utc>,
        symbol: Arc<str>,
        side: Side,
        sequence: u64,
        quantity: u32,
        price: u64,
    },
    /// A bid and an ask were crossed
    TradeExecuted {
        timestamp: DateTime<Utc>,
        symbol: Arc<str>,
        bid_sequence: u64,
        ask_sequence: u64,
        /// Executed quantity
        quantity: u32,
        /// Execution price (always the ask's price)
        price: u64,
    },
}

impl ExchangeEvent {
    pub(crate) fn order_added(order: &Order, quantity: u32) -> Self {
        ExchangeEvent::OrderAdded {
            timestamp: Utc::now(),
            symbol: order.symbol.clone(),
            side: order.side,
            sequence: order.sequence,
            quantity,
            price: order.price,
        }
    }

    pub(crate) fn trade(bid: &Order, ask: &Order, quantity: u32, price: u64) -> Self {
        ExchangeEvent::TradeExecuted {
            timestamp: Utc::now(),
            symbol: bid.symbol.clone(),
            bid_sequence: bid.sequence,
            ask_sequence: ask.sequence,
            quantity,
            price,
        }
    }

    /// When the event was produced
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ExchangeEvent::OrderAdded { timestamp, .. }
            | ExchangeEvent::TradeExecuted { timestamp, .. } => *timestamp,
        }
    }

    /// Symbol the event belongs to
    pub fn symbol(&self) -> &str {
        match self {
            ExchangeEvent::OrderAdded { symbol, .. }
            | ExchangeEvent::TradeExecuted { symbol, .. } => symbol,
        }
    }

    /// Whether this is a trade
    pub fn is_trade(&self) -> bool {
        matches!(self, ExchangeEvent::TradeExecuted { .. })
    }
}

/// Human-readable log line, without the timestamp (the logger adds its own).
impl fmt::Display for ExchangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeEvent::OrderAdded {
                symbol,
                side,
                sequence,
                quantity,
                price,
                ..
            } => write!(
                f,
                "[ADD ORDER] {} {} {} at ${} (seq {})",
                side,
                quantity,
                symbol,
                price::format_ticks(*price),
                sequence
            ),
            ExchangeEvent::TradeExecuted {
                symbol,
                bid_sequence,
                ask_sequence,
                quantity,
                price,
                ..
            } => write!(
                f,
                "[MATCH] {} shares of {} matched at ${} (bid seq {}, ask seq {})",
                quantity,
                symbol,
                price::format_ticks(*price),
                bid_sequence,
                ask_sequence
            ),
        }
    }
}
