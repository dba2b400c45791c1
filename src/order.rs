//! Order node - one resting limit order inside a book.
//!
//! # Quantity word
//!
//! The open quantity lives in a single `AtomicU64`:
//!
//! | Bits   | Field     | Meaning                                  |
//! |--------|-----------|------------------------------------------|
//! | 63..32 | remaining | units no matcher has claimed             |
//! | 31..0  | reserved  | units claimed by a trade in progress     |
//!
//! A matcher first `reserve`s units (CAS loop, never below zero), then
//! `settle`s them: committed units disappear, released units go back to
//! `remaining`. The order is filled exactly when a settle leaves the word
//! at zero, and only the thread whose settle did that retires the node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::atomic_slot::AtomicSlot;
use crate::command::Side;

#[inline]
const fn pack(remaining: u32, reserved: u32) -> u64 {
    ((remaining as u64) << 32) | reserved as u64
}

#[inline]
const fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

/// A limit order linked into an `OrderBook`.
pub struct Order {
    pub side: Side,
    pub symbol: Arc<str>,
    /// Fixed-point price in ticks
    pub price: u64,
    /// Creation sequence; lower is older
    pub sequence: u64,
    quantity: AtomicU64,
    pub(crate) next: AtomicSlot<Order>,
}

impl Order {
    pub fn new(side: Side, symbol: Arc<str>, quantity: u32, price: u64, sequence: u64) -> Self {
        Self {
            side,
            symbol,
            price,
            sequence,
            quantity: AtomicU64::new(pack(quantity, 0)),
            next: AtomicSlot::null(),
        }
    }

    /// Units not yet claimed by any matcher
    #[inline]
    pub fn remaining(&self) -> u32 {
        unpack(self.quantity.load(Ordering::Acquire)).0
    }

    /// Remaining plus units held by in-flight trades
    #[inline]
    pub fn open_quantity(&self) -> u32 {
        let (remaining, reserved) = unpack(self.quantity.load(Ordering::Acquire));
        remaining + reserved
    }

    /// Price-time priority: true if `self` belongs closer to the head than
    /// `other` in a book of `self.side`.
    #[inline]
    pub fn ranks_ahead(&self, other: &Order) -> bool {
        if self.price == other.price {
            return self.sequence < other.sequence;
        }
        match self.side {
            Side::Buy => self.price > other.price,
            Side::Sell => self.price < other.price,
        }
    }

    /// Claim up to `max` units from `remaining`.
    ///
    /// Returns the claimed amount, or `None` if nothing is left or the CAS
    /// lost `spins` times in a row.
    pub fn reserve(&self, max: u32, spins: u32) -> Option<u32> {
        if max == 0 {
            return None;
        }
        let mut current = self.quantity.load(Ordering::Acquire);
        for _ in 0..spins {
            let (remaining, reserved) = unpack(current);
            if remaining == 0 {
                return None;
            }
            let take = remaining.min(max);
            match self.quantity.compare_exchange_weak(
                current,
                pack(remaining - take, reserved + take),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(take),
                Err(actual) => current = actual,
            }
        }
        None
    }

    /// Resolve a reservation of `reserved` units of which `filled` traded.
    ///
    /// The untraded part goes back to `remaining`. A single atomic add, so
    /// it cannot fail. Returns true if the order is now completely filled.
    pub fn settle(&self, reserved: u32, filled: u32) -> bool {
        debug_assert!(filled <= reserved);
        let released = u64::from(reserved - filled) << 32;
        let delta = released.wrapping_sub(u64::from(reserved));
        let previous = self.quantity.fetch_add(delta, Ordering::AcqRel);
        debug_assert!(unpack(previous).1 >= reserved, "settling more than reserved");
        previous.wrapping_add(delta) == 0
    }

    /// Value copy for reporting
    pub fn view(&self) -> OrderView {
        OrderView {
            sequence: self.sequence,
            side: self.side,
            price: self.price,
            quantity: self.open_quantity(),
        }
    }
}

impl std::fmt::Debug for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (remaining, reserved) = unpack(self.quantity.load(Ordering::Relaxed));
        f.debug_struct("Order")
            .field("sequence", &self.sequence)
            .field("side", &self.side)
            .field("symbol", &self.symbol)
            .field("price", &self.price)
            .field("remaining", &remaining)
            .field("reserved", &reserved)
            .finish()
    }
}

/// Point-in-time copy of a live order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderView {
    pub sequence: u64,
    pub side: Side,
    pub price: u64,
    pub quantity: u32,
}

/// Returned by a successful `add_order`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderHandle {
    pub sequence: u64,
    pub side: Side,
    pub symbol: Arc<str>,
    pub quantity: u32,
    pub price: u64,
    /// Insertion attempts it took (1 = no contention)
    pub attempts: u32,
}
