//! Matching Engine - crosses the best bid against the best ask.
//!
//! One `match_symbol` pass repeatedly compares the two book heads and
//! executes while `bid.price >= ask.price`. Several threads may match the
//! same symbol at once, and inserts keep landing in both books meanwhile.
//!
//! # Execution
//! 1. Reserve up to `min(bid, ask)` units on the ask.
//! 2. Reserve up to that many on the bid.
//! 3. Settle: the bid commits everything it reserved, the ask commits the
//!    same amount and releases the rest.
//!
//! Reservation never drives a quantity below zero and units reserved by
//! one matcher are invisible to every other one, so no unit trades twice.
//! The trade executes at the ask price.

use crossbeam::epoch;

use crate::command::ExchangeEvent;
use crate::event_log::EventSink;
use crate::order::Order;
use crate::order_book::Front;
use crate::retry::RetryPolicy;
use crate::symbol_index::{SymbolHashIndex, SymbolNode};

/// Outcome of crossing one bid with one ask
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fill {
    pub quantity: u32,
    /// Always the ask's price
    pub price: u64,
    pub bid_filled: bool,
    pub ask_filled: bool,
}

/// Stateless matcher carrying its iteration bounds
#[derive(Clone, Copy, Debug)]
pub struct MatchingEngine {
    max_iterations: usize,
    reserve_spins: u32,
    unlink_attempts: u32,
}

impl MatchingEngine {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            max_iterations: policy.match_iterations,
            reserve_spins: policy.reserve_spins,
            unlink_attempts: policy.insert_attempts,
        }
    }

    /// Match one symbol until its books no longer cross or the iteration
    /// budget is spent.
    ///
    /// # Returns
    /// Number of trades executed
    pub fn match_symbol<S: EventSink + ?Sized>(&self, node: &SymbolNode, sink: &S) -> usize {
        let guard = epoch::pin();
        let mut trades = 0;

        for _ in 0..self.max_iterations {
            let (bid, ask) = match (node.bids.front(&guard), node.asks.front(&guard)) {
                (Front::Order(bid), Front::Order(ask)) => (bid, ask),
                (Front::Contended, _) | (_, Front::Contended) => continue,
                _ => return trades,
            };
            if bid.price < ask.price {
                return trades;
            }

            let fill = match self.execute(bid, ask) {
                Some(fill) => fill,
                // Quantity held by another matcher's in-flight trade
                None => continue,
            };

            trades += 1;
            sink.emit(ExchangeEvent::trade(bid, ask, fill.quantity, fill.price));

            if fill.bid_filled {
                node.bids.retire(bid, self.unlink_attempts, &guard);
            }
            if fill.ask_filled {
                node.asks.retire(ask, self.unlink_attempts, &guard);
            }
        }

        log::debug!(
            "match budget of {} iterations spent on {} after {} trades",
            self.max_iterations,
            node.symbol(),
            trades
        );
        trades
    }

    /// Every symbol in bucket order, chain order within a bucket.
    pub fn match_all<S: EventSink + ?Sized>(&self, index: &SymbolHashIndex, sink: &S) -> usize {
        index.iter().map(|node| self.match_symbol(node, sink)).sum()
    }

    /// Trade `min(bid, ask)` units between two crossing orders.
    ///
    /// Returns `None` when either side has nothing left to reserve.
    pub fn execute(&self, bid: &Order, ask: &Order) -> Option<Fill> {
        let wanted = bid.remaining().min(ask.remaining());
        let on_ask = ask.reserve(wanted, self.reserve_spins)?;
        let on_bid = match bid.reserve(on_ask, self.reserve_spins) {
            Some(taken) => taken,
            None => {
                ask.settle(on_ask, 0);
                return None;
            }
        };

        let bid_filled = bid.settle(on_bid, on_bid);
        let ask_filled = ask.settle(on_ask, on_bid);
        Some(Fill {
            quantity: on_bid,
            price: ask.price,
            bid_filled,
            ask_filled,
        })
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(&RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Side;
    use crate::event_log::{NullSink, VecSink};
    use std::sync::Arc;

    fn order(side: Side, qty: u32, price: u64, sequence: u64) -> Order {
        Order::new(side, Arc::from("AAPL"), qty, price, sequence)
    }

    fn place(node: &SymbolNode, side: Side, qty: u32, price: u64, sequence: u64) {
        let order = Order::new(side, node.symbol_arc(), qty, price, sequence);
        node.book(side).insert(order, &RetryPolicy::default()).unwrap();
    }

    #[test]
    fn test_execute_partial() {
        let engine = MatchingEngine::default();
        let bid = order(Side::Buy, 50, 15025, 1);
        let ask = order(Side::Sell, 30, 15000, 2);
        let fill = engine.execute(&bid, &ask).unwrap();
        assert_eq!(
            fill,
            Fill {
                quantity: 30,
                price: 15000,
                bid_filled: false,
                ask_filled: true
            }
        );
        assert_eq!(bid.open_quantity(), 20);
        assert_eq!(ask.open_quantity(), 0);
    }

    #[test]
    fn test_execute_equal_quantities_fill_both() {
        let engine = MatchingEngine::default();
        let bid = order(Side::Buy, 40, 100, 1);
        let ask = order(Side::Sell, 40, 100, 2);
        let fill = engine.execute(&bid, &ask).unwrap();
        assert!(fill.bid_filled && fill.ask_filled);
        assert_eq!(fill.quantity, 40);
    }

    #[test]
    fn test_execute_releases_ask_when_bid_is_taken() {
        let engine = MatchingEngine::default();
        let bid = order(Side::Buy, 10, 100, 1);
        let ask = order(Side::Sell, 10, 100, 2);
        // Another matcher holds the whole bid
        let held = bid.reserve(10, 8).unwrap();
        assert_eq!(engine.execute(&bid, &ask), None);
        assert_eq!(ask.remaining(), 10);
        bid.settle(held, 0);
    }

    #[test]
    fn test_match_symbol_single_trade() {
        let index = SymbolHashIndex::new();
        let node = index.get_or_create("AAPL", 8).unwrap();
        place(node, Side::Buy, 50, 15025, 1);
        place(node, Side::Sell, 30, 15000, 2);

        let sink = VecSink::new();
        let engine = MatchingEngine::default();
        assert_eq!(engine.match_symbol(node, &sink), 1);

        let events = sink.take();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ExchangeEvent::TradeExecuted {
                bid_sequence,
                ask_sequence,
                quantity,
                price,
                ..
            } => {
                assert_eq!((*bid_sequence, *ask_sequence), (1, 2));
                assert_eq!((*quantity, *price), (30, 15000));
            }
            other => panic!("unexpected event {other:?}"),
        }

        let bids = node.bids.snapshot();
        assert_eq!(bids.len(), 1);
        assert_eq!((bids[0].quantity, bids[0].price), (20, 15025));
        assert!(node.asks.is_empty());
    }

    #[test]
    fn test_no_cross_no_trade() {
        let index = SymbolHashIndex::new();
        let node = index.get_or_create("MSFT", 8).unwrap();
        place(node, Side::Buy, 10, 29900, 1);
        place(node, Side::Sell, 100, 30000, 2);
        assert_eq!(MatchingEngine::default().match_symbol(node, &NullSink), 0);
        assert_eq!(node.asks.best().unwrap().quantity, 100);
        assert_eq!(node.bids.best().unwrap().quantity, 10);
    }

    #[test]
    fn test_sweeps_multiple_levels() {
        let index = SymbolHashIndex::new();
        let node = index.get_or_create("TSLA", 8).unwrap();
        place(node, Side::Sell, 10, 100, 1);
        place(node, Side::Sell, 10, 101, 2);
        place(node, Side::Sell, 10, 105, 3);
        place(node, Side::Buy, 25, 102, 4);

        let sink = VecSink::new();
        assert_eq!(MatchingEngine::default().match_symbol(node, &sink), 2);
        let prices: Vec<u64> = sink
            .take()
            .iter()
            .map(|e| match e {
                ExchangeEvent::TradeExecuted { price, .. } => *price,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(prices, vec![100, 101]);
        assert_eq!(node.bids.best().unwrap().quantity, 5);
        assert_eq!(node.asks.best().unwrap().price, 105);
    }

    #[test]
    fn test_iteration_budget_bounds_trades() {
        let index = SymbolHashIndex::new();
        let node = index.get_or_create("AMZN", 8).unwrap();
        for seq in 0..10 {
            place(node, Side::Sell, 1, 100, seq);
        }
        place(node, Side::Buy, 10, 100, 10);

        let engine = MatchingEngine::new(&RetryPolicy {
            match_iterations: 3,
            ..RetryPolicy::default()
        });
        assert_eq!(engine.match_symbol(node, &NullSink), 3);
        assert_eq!(node.asks.len(), 7);
        assert_eq!(engine.match_symbol(node, &NullSink), 3);
        assert_eq!(node.asks.len(), 4);
    }

    #[test]
    fn test_match_all_covers_every_symbol() {
        let index = SymbolHashIndex::new();
        for (seq, symbol) in ["AAPL", "GOOG", "NFLX"].iter().enumerate() {
            let node = index.get_or_create(symbol, 8).unwrap();
            let seq = seq as u64 * 2;
            place(node, Side::Buy, 5, 100, seq);
            place(node, Side::Sell, 5, 100, seq + 1);
        }
        assert_eq!(MatchingEngine::default().match_all(&index, &NullSink), 3);
        assert!(index.iter().all(|n| n.bids.is_empty() && n.asks.is_empty()));
    }
}
