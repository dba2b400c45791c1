//! Order Book - one side of one symbol, as a lock-free sorted chain.
//!
//! Orders are linked head-to-tail in price-time priority: best price first,
//! lower sequence first at equal price. Every mutation is a single CAS on
//! one `next` slot (or the head slot).
//!
//! Removal is two-phase. The retiring thread sets the mark bit on the
//! node's own `next` slot, which freezes it; any traversal that later
//! walks over the node snips it out of the chain with one CAS on the
//! predecessor and hands it to the epoch collector. Readers skip marked
//! nodes, so a removed order is never reported even before it is unlinked.

use arrayvec::ArrayVec;
use crossbeam::epoch::{self, Guard, Owned, Shared};
use crossbeam::utils::Backoff;

use crate::atomic_slot::{is_marked, AtomicSlot};
use crate::command::Side;
use crate::error::ExchangeError;
use crate::order::{Order, OrderView};
use crate::retry::RetryPolicy;

/// First order of a book as seen by the matcher
pub(crate) enum Front<'g> {
    Empty,
    Order(&'g Order),
    /// A removed head could not be unlinked this time around
    Contended,
}

/// Price-ordered chain of resting orders for one side.
pub struct OrderBook {
    side: Side,
    head: AtomicSlot<Order>,
}

impl OrderBook {
    /// Create an empty book for `side`
    pub fn new(side: Side) -> Self {
        Self {
            side,
            head: AtomicSlot::null(),
        }
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Walk from the head to the first live order for which `stop` holds.
    ///
    /// Returns the slot that points at that order together with the order
    /// pointer (null if the walk ran off the tail). Marked nodes met on the
    /// way are unlinked. Returns `None` when an unlink CAS loses a race;
    /// the caller restarts from the head.
    fn search<'g, F>(
        &'g self,
        guard: &'g Guard,
        mut stop: F,
    ) -> Option<(&'g AtomicSlot<Order>, Shared<'g, Order>)>
    where
        F: FnMut(&Order) -> bool,
    {
        let mut link = &self.head;
        let mut cur = link.get(guard);
        loop {
            // SAFETY: reached from the chain under `guard`; nodes are only
            // destroyed through `defer_destroy` after being unlinked.
            let node = match unsafe { cur.as_ref() } {
                Some(node) => node,
                None => return Some((link, cur)),
            };
            let succ = node.next.get(guard);
            if is_marked(succ) {
                let succ = succ.with_tag(0);
                if !link.compare_and_set(cur, succ, guard) {
                    return None;
                }
                // SAFETY: the CAS above made this thread the only one to
                // unlink `cur`; it is unreachable from the head now.
                unsafe { guard.defer_destroy(cur) };
                cur = succ;
                continue;
            }
            if stop(node) {
                return Some((link, cur));
            }
            link = &node.next;
            cur = succ;
        }
    }

    /// Best live order, unlinking removed heads on the way.
    pub(crate) fn front<'g>(&'g self, guard: &'g Guard) -> Front<'g> {
        match self.search(guard, |_| true) {
            // SAFETY: returned by `search` under the same guard
            Some((_, head)) => match unsafe { head.as_ref() } {
                Some(order) => Front::Order(order),
                None => Front::Empty,
            },
            None => Front::Contended,
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Link `order` at its price-time position.
    ///
    /// # Returns
    /// The number of attempts it took, or `InsertFailure` once
    /// `policy.insert_attempts` CAS attempts have failed. On failure the
    /// order was never published and has been freed.
    pub fn insert(&self, order: Order, policy: &RetryPolicy) -> Result<u32, ExchangeError> {
        debug_assert_eq!(order.side, self.side);
        let mut pending = Owned::new(order);
        let mut backoff = policy.backoff();

        for attempt in 1..=policy.insert_attempts {
            {
                let guard = epoch::pin();
                let position = self.search(&guard, |existing| pending.ranks_ahead(existing));
                if let Some((link, cur)) = position {
                    pending.next.store(cur);
                    let new = pending.into_shared(&guard);
                    if link.compare_and_set(cur, new, &guard) {
                        return Ok(attempt);
                    }
                    // SAFETY: the CAS failed, so `new` was never published
                    pending = unsafe { new.into_owned() };
                }
            }
            if attempt < policy.insert_attempts {
                backoff.wait();
            }
        }

        log::warn!(
            "{} order seq {} for {} not inserted after {} attempts",
            self.side,
            pending.sequence,
            pending.symbol,
            policy.insert_attempts
        );
        Err(ExchangeError::InsertFailure {
            symbol: pending.symbol.to_string(),
            attempts: policy.insert_attempts,
        })
    }

    /// Mark a filled order removed and try to unlink it.
    ///
    /// Called only by the thread whose settle brought the order to zero.
    /// Returns false if the unlink budget ran out; the node then stays
    /// invisible and a later traversal removes it.
    pub(crate) fn retire(&self, order: &Order, attempts: u32, guard: &Guard) -> bool {
        order.next.mark(guard);
        let backoff = Backoff::new();
        for _ in 0..attempts {
            // Every live node ahead of `order` ranks ahead of it, so the walk
            // passes its position before stopping.
            if self.search(guard, |existing| order.ranks_ahead(existing)).is_some() {
                return true;
            }
            backoff.spin();
        }
        log::debug!(
            "{} order seq {} for {} left marked after {} unlink attempts",
            self.side,
            order.sequence,
            order.symbol,
            attempts
        );
        false
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Live orders head-to-tail. Marked nodes and orders whose open
    /// quantity already reached zero are skipped.
    pub fn live<'g>(&'g self, guard: &'g Guard) -> LiveOrders<'g> {
        LiveOrders {
            cur: self.head.get(guard),
            guard,
        }
    }

    /// Best live order
    pub fn best(&self) -> Option<OrderView> {
        let guard = epoch::pin();
        let best = self.live(&guard).next().map(Order::view);
        best
    }

    /// Every live order, head-to-tail
    pub fn snapshot(&self) -> Vec<OrderView> {
        let guard = epoch::pin();
        let orders = self.live(&guard).map(Order::view).collect();
        orders
    }

    /// The first `N` live orders
    pub fn depth<const N: usize>(&self) -> ArrayVec<OrderView, N> {
        let guard = epoch::pin();
        let levels = self.live(&guard).take(N).map(Order::view).collect();
        levels
    }

    /// Number of live orders
    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        let count = self.live(&guard).count();
        count
    }

    pub fn is_empty(&self) -> bool {
        self.best().is_none()
    }

    /// Total open quantity across live orders
    pub fn open_quantity(&self) -> u64 {
        let guard = epoch::pin();
        let total = self
            .live(&guard)
            .map(|order| u64::from(order.open_quantity()))
            .sum();
        total
    }
}

impl Drop for OrderBook {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can reach the chain.
        // Unlinked nodes were already handed to the collector and are not
        // reachable from the head.
        unsafe {
            let guard = epoch::unprotected();
            let mut cur = self.head.get(guard);
            while !cur.is_null() {
                let next = cur.deref().next.get(guard).with_tag(0);
                drop(cur.into_owned());
                cur = next;
            }
        }
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("side", &self.side)
            .field("orders", &self.snapshot())
            .finish()
    }
}

/// Iterator over the live orders of one book
pub struct LiveOrders<'g> {
    cur: Shared<'g, Order>,
    guard: &'g Guard,
}

impl<'g> Iterator for LiveOrders<'g> {
    type Item = &'g Order;

    fn next(&mut self) -> Option<&'g Order> {
        loop {
            // SAFETY: every node reached from the head, or from the frozen
            // `next` of a node reached that way, outlives the guard.
            let node = unsafe { self.cur.as_ref() }?;
            let succ = node.next.get(self.guard);
            self.cur = succ.with_tag(0);
            if !is_marked(succ) && node.open_quantity() > 0 {
                return Some(node);
            }
        }
    }
}
