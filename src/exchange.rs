//! Exchange - the public face of the matching core.
//!
//! Owns the symbol index, the matcher, the global sequence counter and the
//! event sink. `add_order` and `match_all` may be called from any number of
//! threads at once through a shared reference.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use arrayvec::ArrayVec;

use crate::command::{ExchangeEvent, PlaceOrder, Side};
use crate::config::EngineConfig;
use crate::error::ExchangeError;
use crate::event_log::{EventSink, NullSink};
use crate::matching::MatchingEngine;
use crate::order::{Order, OrderHandle, OrderView};
use crate::price;
use crate::retry::RetryPolicy;
use crate::symbol_index::SymbolHashIndex;

/// Orders per side captured by `Exchange::book`
pub const SNAPSHOT_DEPTH: usize = 32;

/// Aggregate counters since construction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    pub orders_added: u64,
    pub insert_failures: u64,
    pub trades_executed: u64,
}

/// Bounded copy of both books of one symbol
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookSnapshot {
    pub symbol: String,
    pub bids: ArrayVec<OrderView, SNAPSHOT_DEPTH>,
    pub asks: ArrayVec<OrderView, SNAPSHOT_DEPTH>,
}

impl BookSnapshot {
    fn write_side(
        f: &mut fmt::Formatter<'_>,
        title: &str,
        symbol: &str,
        orders: &[OrderView],
    ) -> fmt::Result {
        if orders.is_empty() {
            return writeln!(f, "{}: EMPTY", title);
        }
        writeln!(f, "{}:", title)?;
        for order in orders {
            writeln!(
                f,
                "  {} {} {} at ${} (seq {})",
                order.side,
                order.quantity,
                symbol,
                price::format_ticks(order.price),
                order.sequence
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for BookSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Self::write_side(f, "BUY BOOK", &self.symbol, &self.bids)?;
        Self::write_side(f, "SELL BOOK", &self.symbol, &self.asks)
    }
}

/// Multi-symbol lock-free exchange
pub struct Exchange<S: EventSink = NullSink> {
    index: SymbolHashIndex,
    matcher: MatchingEngine,
    policy: RetryPolicy,
    sequence: AtomicU64,
    orders_added: AtomicU64,
    insert_failures: AtomicU64,
    trades_executed: AtomicU64,
    sink: S,
}

impl Exchange<NullSink> {
    /// Default configuration, events discarded
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default(), NullSink)
    }
}

impl Default for Exchange<NullSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EventSink> Exchange<S> {
    pub fn with_config(config: &EngineConfig, sink: S) -> Self {
        Self::with_policy(config.retry_policy(), sink)
    }

    pub fn with_policy(policy: RetryPolicy, sink: S) -> Self {
        Self {
            index: SymbolHashIndex::new(),
            matcher: MatchingEngine::new(&policy),
            policy,
            sequence: AtomicU64::new(1),
            orders_added: AtomicU64::new(0),
            insert_failures: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            sink,
        }
    }

    // ========================================================================
    // Core operations
    // ========================================================================

    /// Insert a limit order into its symbol's book.
    ///
    /// # Arguments
    /// * `side` - Buy or Sell
    /// * `symbol` - Ticker, created on first use
    /// * `quantity` - Units, must be positive
    /// * `price` - Price in ticks, must be positive
    ///
    /// # Returns
    /// A handle describing the resting order, or an error. Transient
    /// errors (`is_transient`) leave no trace and may be resubmitted.
    pub fn add_order(
        &self,
        side: Side,
        symbol: &str,
        quantity: u32,
        price: u64,
    ) -> Result<OrderHandle, ExchangeError> {
        if symbol.is_empty() {
            return Err(ExchangeError::InvalidSymbol);
        }
        if quantity == 0 {
            return Err(ExchangeError::InvalidQuantity(quantity));
        }
        if price == 0 {
            return Err(ExchangeError::InvalidPrice(price));
        }

        let node = self
            .index
            .get_or_create(symbol, self.policy.symbol_attempts)
            .map_err(|err| self.record_failure(err))?;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let order = Order::new(side, node.symbol_arc(), quantity, price, sequence);
        let event = ExchangeEvent::order_added(&order, quantity);

        let attempts = node
            .book(side)
            .insert(order, &self.policy)
            .map_err(|err| self.record_failure(err))?;

        self.orders_added.fetch_add(1, Ordering::Relaxed);
        self.sink.emit(event);

        Ok(OrderHandle {
            sequence,
            side,
            symbol: node.symbol_arc(),
            quantity,
            price,
            attempts,
        })
    }

    /// `add_order` for a command value
    pub fn place(&self, command: &PlaceOrder) -> Result<OrderHandle, ExchangeError> {
        self.add_order(command.side, &command.symbol, command.quantity, command.price)
    }

    /// Match every symbol once; returns the number of trades.
    pub fn match_all(&self) -> usize {
        let trades = self.matcher.match_all(&self.index, &self.sink);
        self.trades_executed.fetch_add(trades as u64, Ordering::Relaxed);
        trades
    }

    /// Match a single symbol; unknown symbols trade nothing.
    pub fn match_symbol(&self, symbol: &str) -> usize {
        let trades = match self.index.get(symbol) {
            Some(node) => self.matcher.match_symbol(node, &self.sink),
            None => 0,
        };
        self.trades_executed.fetch_add(trades as u64, Ordering::Relaxed);
        trades
    }

    fn record_failure(&self, err: ExchangeError) -> ExchangeError {
        self.insert_failures.fetch_add(1, Ordering::Relaxed);
        err
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Top of both books for `symbol`
    pub fn book(&self, symbol: &str) -> Option<BookSnapshot> {
        let node = self.index.get(symbol)?;
        Some(BookSnapshot {
            symbol: node.symbol().to_string(),
            bids: node.bids.depth(),
            asks: node.asks.depth(),
        })
    }

    /// Best live bid
    pub fn best_bid(&self, symbol: &str) -> Option<OrderView> {
        self.index.get(symbol)?.bids.best()
    }

    /// Best live ask
    pub fn best_ask(&self, symbol: &str) -> Option<OrderView> {
        self.index.get(symbol)?.asks.best()
    }

    /// Ask minus bid in ticks; negative while the books are crossed and
    /// not yet matched.
    pub fn spread(&self, symbol: &str) -> Option<i64> {
        let bid = self.best_bid(symbol)?;
        let ask = self.best_ask(symbol)?;
        Some(ask.price as i64 - bid.price as i64)
    }

    pub fn symbol_count(&self) -> usize {
        self.index.len()
    }

    pub fn stats(&self) -> ExchangeStats {
        ExchangeStats {
            orders_added: self.orders_added.load(Ordering::Relaxed),
            insert_failures: self.insert_failures.load(Ordering::Relaxed),
            trades_executed: self.trades_executed.load(Ordering::Relaxed),
        }
    }

    /// Underlying index, for read-only inspection
    pub fn index(&self) -> &SymbolHashIndex {
        &self.index
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: EventSink> fmt::Debug for Exchange<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("symbols", &self.symbol_count())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::VecSink;
    use crate::symbol_index::bucket_of;

    fn recording() -> Exchange<VecSink> {
        Exchange::with_config(&EngineConfig::default(), VecSink::new())
    }

    #[test]
    fn test_scenario_partial_match() {
        let exchange = recording();
        let bid = exchange.add_order(Side::Buy, "AAPL", 50, 15025).unwrap();
        let ask = exchange.add_order(Side::Sell, "AAPL", 30, 15000).unwrap();
        assert!(bid.sequence < ask.sequence);
        assert_eq!(bid.attempts, 1);

        assert_eq!(exchange.match_all(), 1);

        let events = exchange.sink().take();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2].to_string(),
            format!(
                "[MATCH] 30 shares of AAPL matched at $150.00 (bid seq {}, ask seq {})",
                bid.sequence, ask.sequence
            )
        );

        let book = exchange.book("AAPL").unwrap();
        assert_eq!(book.bids.len(), 1);
        assert_eq!((book.bids[0].quantity, book.bids[0].price), (20, 15025));
        assert!(book.asks.is_empty());
        assert_eq!(
            exchange.stats(),
            ExchangeStats {
                orders_added: 2,
                insert_failures: 0,
                trades_executed: 1
            }
        );
    }

    #[test]
    fn test_scenario_equal_price_fifo() {
        let exchange = Exchange::new();
        let first = exchange.add_order(Side::Buy, "AAPL", 10, 15000).unwrap();
        let second = exchange.add_order(Side::Buy, "AAPL", 10, 15000).unwrap();
        let book = exchange.book("AAPL").unwrap();
        let sequences: Vec<u64> = book.bids.iter().map(|o| o.sequence).collect();
        assert_eq!(sequences, vec![first.sequence, second.sequence]);
    }

    #[test]
    fn test_scenario_colliding_symbols() {
        let target = bucket_of("AAPL");
        let other = (0..100_000)
            .map(|i| format!("S{i}"))
            .find(|s| bucket_of(s) == target)
            .unwrap();

        let exchange = Exchange::new();
        exchange.add_order(Side::Buy, "AAPL", 10, 100).unwrap();
        exchange.add_order(Side::Buy, &other, 7, 200).unwrap();
        exchange.add_order(Side::Sell, "AAPL", 10, 100).unwrap();
        exchange.add_order(Side::Sell, &other, 3, 150).unwrap();
        assert_eq!(exchange.index().chain_len(target), 2);

        assert_eq!(exchange.match_all(), 2);
        assert!(exchange.best_bid("AAPL").is_none());
        assert_eq!(exchange.best_bid(&other).unwrap().quantity, 4);
        assert!(exchange.best_ask(&other).is_none());
    }

    #[test]
    fn test_scenario_no_bid_no_trade() {
        let exchange = Exchange::new();
        let ask = exchange.add_order(Side::Sell, "MSFT", 100, 30000).unwrap();
        assert_eq!(exchange.match_all(), 0);
        let head = exchange.best_ask("MSFT").unwrap();
        assert_eq!((head.sequence, head.quantity), (ask.sequence, 100));
        assert_eq!(exchange.spread("MSFT"), None);
    }

    #[test]
    fn test_rejects_invalid_input() {
        let exchange = Exchange::new();
        assert_eq!(
            exchange.add_order(Side::Buy, "AAPL", 0, 100),
            Err(ExchangeError::InvalidQuantity(0))
        );
        assert_eq!(
            exchange.add_order(Side::Buy, "AAPL", 10, 0),
            Err(ExchangeError::InvalidPrice(0))
        );
        assert_eq!(
            exchange.add_order(Side::Buy, "", 10, 100),
            Err(ExchangeError::InvalidSymbol)
        );
        assert_eq!(exchange.symbol_count(), 0);
        assert_eq!(exchange.stats(), ExchangeStats::default());
    }

    #[test]
    fn test_insert_failure_is_counted() {
        let policy = RetryPolicy {
            insert_attempts: 0,
            ..RetryPolicy::default()
        };
        let exchange = Exchange::with_policy(policy, VecSink::new());
        let err = exchange.add_order(Side::Sell, "AAPL", 10, 100).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(exchange.stats().insert_failures, 1);
        assert!(exchange.sink().is_empty());
        // The symbol exists even though its first order never landed
        assert_eq!(exchange.symbol_count(), 1);
        assert!(exchange.book("AAPL").unwrap().asks.is_empty());
    }

    #[test]
    fn test_spread_and_snapshot_display() {
        let exchange = Exchange::new();
        exchange.add_order(Side::Buy, "GOOG", 5, 9950).unwrap();
        exchange
            .place(&PlaceOrder {
                side: Side::Sell,
                symbol: "GOOG".into(),
                quantity: 8,
                price: 10025,
            })
            .unwrap();
        assert_eq!(exchange.spread("GOOG"), Some(75));
        assert_eq!(exchange.match_symbol("GOOG"), 0);
        assert_eq!(exchange.match_symbol("NONE"), 0);

        let text = exchange.book("GOOG").unwrap().to_string();
        assert_eq!(
            text,
            "BUY BOOK:\n  Buy 5 GOOG at $99.50 (seq 1)\nSELL BOOK:\n  Sell 8 GOOG at $100.25 (seq 2)\n"
        );
        assert!(exchange.book("NONE").is_none());
    }
}
