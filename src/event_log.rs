//! Event Log - asynchronous sink for exchange events.
//!
//! The core only enqueues. A single tokio task owns the receiving end and
//! renders each event through the `log` facade, so no writer ever sits on
//! the insertion or matching path.
//!
//! ```text
//! [add_order / match_all] --emit--> [unbounded mpsc] --> [log task] --> log::info!
//! ```

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::command::ExchangeEvent;

/// Log target used for rendered events
pub const EVENT_TARGET: &str = "exchange::events";

/// Receiver of exchange events.
///
/// `emit` is called from inside insertion and matching; it must not block
/// beyond enqueueing.
///
/// Events from one caller arrive in that caller's order. Across callers
/// there is no ordering, including for a single order: `OrderAdded` is
/// emitted after the order is linked, so a concurrent matcher may emit a
/// `TradeExecuted` naming that sequence first.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ExchangeEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    #[inline]
    fn emit(&self, event: ExchangeEvent) {
        (**self).emit(event)
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    #[inline]
    fn emit(&self, _event: ExchangeEvent) {}
}

/// Sending half of an `EventLog`
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: UnboundedSender<ExchangeEvent>,
}

impl EventSink for EventSender {
    #[inline]
    fn emit(&self, event: ExchangeEvent) {
        // Only fails once the log task is gone; nothing left to report to.
        let _ = self.tx.send(event);
    }
}

/// Background task draining events into the logger.
pub struct EventLog;

impl EventLog {
    /// Start the log task on the current tokio runtime.
    ///
    /// The task runs until every clone of the returned sender is dropped,
    /// then resolves to the number of events it wrote.
    pub fn spawn() -> (EventSender, JoinHandle<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(Self::drain(rx));
        (EventSender { tx }, handle)
    }

    async fn drain(mut rx: UnboundedReceiver<ExchangeEvent>) -> u64 {
        let mut written = 0u64;
        while let Some(event) = rx.recv().await {
            log::info!(target: EVENT_TARGET, "{} {}", event.timestamp().format("%H:%M:%S%.6f"), event);
            written += 1;
        }
        log::debug!(target: EVENT_TARGET, "event log closed after {} events", written);
        written
    }
}

/// Collects events in memory, in emission order.
#[derive(Debug, Default)]
pub struct VecSink {
    events: Mutex<Vec<ExchangeEvent>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every event collected so far
    pub fn take(&self) -> Vec<ExchangeEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for VecSink {
    fn emit(&self, event: ExchangeEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Side;
    use chrono::Utc;

    fn added(sequence: u64) -> ExchangeEvent {
        ExchangeEvent::OrderAdded {
            timestamp: Utc::now(),
            symbol: Arc::from("AAPL"),
            side: Side::Buy,
            sequence,
            quantity: 10,
            price: 15000,
        }
    }

    #[tokio::test]
    async fn test_log_task_counts_events() {
        let (sender, handle) = EventLog::spawn();
        let clone = sender.clone();
        for seq in 0..5 {
            sender.emit(added(seq));
        }
        clone.emit(added(5));
        drop(sender);
        drop(clone);
        assert_eq!(handle.await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_senders_from_threads() {
        let (sender, handle) = EventLog::spawn();
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let sender = sender.clone();
                std::thread::spawn(move || {
                    for seq in 0..25 {
                        sender.emit(added(t * 100 + seq));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        drop(sender);
        assert_eq!(handle.await.unwrap(), 100);
    }

    #[test]
    fn test_vec_sink_preserves_order() {
        let sink = VecSink::new();
        for seq in 0..3 {
            sink.emit(added(seq));
        }
        assert_eq!(sink.len(), 3);
        let events = sink.take();
        let sequences: Vec<u64> = events
            .iter()
            .map(|e| match e {
                ExchangeEvent::OrderAdded { sequence, .. } => *sequence,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_null_sink_through_arc() {
        let sink: Arc<dyn EventSink> = Arc::new(NullSink);
        sink.emit(added(1));
    }
}
