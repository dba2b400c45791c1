//! Symbol Hash Index - fixed bucket array of lock-free symbol chains.
//!
//! 1024 buckets addressed by 32-bit FNV-1a over the symbol bytes. Each
//! bucket holds a singly-linked chain of `SymbolNode`s; new symbols are
//! pushed at the bucket head with one CAS. Nodes are never unlinked, so a
//! reference handed out by the index stays valid for the index's lifetime.

use std::sync::Arc;

use crossbeam::epoch::{self, Guard, Owned, Shared};

use crate::atomic_slot::AtomicSlot;
use crate::command::Side;
use crate::error::ExchangeError;
use crate::order_book::OrderBook;

/// Number of buckets; fixed for the lifetime of an index
pub const BUCKET_COUNT: usize = 1024;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV-1a
#[inline]
pub fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Bucket a symbol lives in
#[inline]
pub fn bucket_of(symbol: &str) -> usize {
    fnv1a(symbol.as_bytes()) as usize % BUCKET_COUNT
}

/// Both books of one symbol, linked into a bucket chain.
pub struct SymbolNode {
    symbol: Arc<str>,
    pub bids: OrderBook,
    pub asks: OrderBook,
    next: AtomicSlot<SymbolNode>,
}

impl SymbolNode {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: Arc::from(symbol),
            bids: OrderBook::new(Side::Buy),
            asks: OrderBook::new(Side::Sell),
            next: AtomicSlot::null(),
        }
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Shared handle to the symbol string, cloned into every order
    #[inline]
    pub fn symbol_arc(&self) -> Arc<str> {
        self.symbol.clone()
    }

    #[inline]
    pub fn book(&self, side: Side) -> &OrderBook {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }
}

impl std::fmt::Debug for SymbolNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolNode")
            .field("symbol", &self.symbol)
            .field("bids", &self.bids.len())
            .field("asks", &self.asks.len())
            .finish()
    }
}

/// Fixed-capacity hash index from symbol to its books.
pub struct SymbolHashIndex {
    buckets: Box<[AtomicSlot<SymbolNode>]>,
}

impl SymbolHashIndex {
    pub fn new() -> Self {
        Self {
            buckets: (0..BUCKET_COUNT).map(|_| AtomicSlot::null()).collect(),
        }
    }

    /// Walk a chain starting at `head` looking for `symbol`.
    fn find<'a, 'g>(
        &'a self,
        mut cur: Shared<'g, SymbolNode>,
        symbol: &str,
        guard: &'g Guard,
    ) -> Option<&'a SymbolNode> {
        // SAFETY: symbol nodes are freed only in `Drop`, which needs
        // `&mut self`, so they outlive `&'a self`.
        while let Some(node) = unsafe { cur.as_raw().as_ref() } {
            if node.symbol() == symbol {
                return Some(node);
            }
            cur = node.next.get(guard);
        }
        None
    }

    /// Look up a symbol without creating it.
    pub fn get(&self, symbol: &str) -> Option<&SymbolNode> {
        let guard = epoch::pin();
        let head = self.buckets[bucket_of(symbol)].get(&guard);
        self.find(head, symbol, &guard)
    }

    /// Find the node for `symbol`, publishing a new one if absent.
    ///
    /// At most one node per symbol ever becomes reachable: a thread that
    /// loses the head CAS re-scans the chain and discards its allocation
    /// if the symbol showed up in the meantime.
    pub fn get_or_create(&self, symbol: &str, attempts: u32) -> Result<&SymbolNode, ExchangeError> {
        let slot = &self.buckets[bucket_of(symbol)];
        let guard = epoch::pin();
        let mut fresh: Option<Owned<SymbolNode>> = None;

        for _ in 0..attempts {
            let head = slot.get(&guard);
            if let Some(found) = self.find(head, symbol, &guard) {
                return Ok(found);
            }

            let node = fresh.take().unwrap_or_else(|| Owned::new(SymbolNode::new(symbol)));
            node.next.store(head);
            let shared = node.into_shared(&guard);
            if slot.compare_and_set(head, shared, &guard) {
                // SAFETY: published, and never freed before the index
                return Ok(unsafe { &*shared.as_raw() });
            }
            // SAFETY: the CAS failed, the node was never visible
            fresh = Some(unsafe { shared.into_owned() });
        }

        log::warn!("symbol {} not created after {} attempts", symbol, attempts);
        Err(ExchangeError::SymbolContention {
            symbol: symbol.to_string(),
            attempts,
        })
    }

    /// Every symbol node, in bucket order then chain order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            index: self,
            bucket: 0,
            cur: std::ptr::null(),
        }
    }

    /// Number of distinct symbols
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Number of symbols chained in `bucket`
    pub fn chain_len(&self, bucket: usize) -> usize {
        let guard = epoch::pin();
        let mut cur = match self.buckets.get(bucket) {
            Some(slot) => slot.get(&guard),
            None => return 0,
        };
        let mut count = 0;
        // SAFETY: see `find`
        while let Some(node) = unsafe { cur.as_ref() } {
            count += 1;
            cur = node.next.get(&guard);
        }
        count
    }
}

impl Default for SymbolHashIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SymbolHashIndex {
    fn drop(&mut self) {
        // SAFETY: exclusive access; symbol nodes are never shared with the
        // collector, so each is freed exactly once here.
        unsafe {
            let guard = epoch::unprotected();
            for slot in self.buckets.iter() {
                let mut cur = slot.get(guard);
                while !cur.is_null() {
                    let next = cur.deref().next.get(guard);
                    drop(cur.into_owned());
                    cur = next;
                }
            }
        }
    }
}

impl std::fmt::Debug for SymbolHashIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over every `SymbolNode` of an index
pub struct Iter<'a> {
    index: &'a SymbolHashIndex,
    bucket: usize,
    cur: *const SymbolNode,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a SymbolNode;

    fn next(&mut self) -> Option<&'a SymbolNode> {
        let guard = epoch::pin();
        loop {
            // SAFETY: `cur` came from the chain; see `find`
            if let Some(node) = unsafe { self.cur.as_ref() } {
                self.cur = node.next.get(&guard).as_raw();
                return Some(node);
            }
            let slot = self.index.buckets.get(self.bucket)?;
            self.bucket += 1;
            self.cur = slot.get(&guard).as_raw();
        }
    }
}
