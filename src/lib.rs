//! # Lockfree Exchange
//!
//! A multi-symbol limit order matching engine where every book is a
//! lock-free sorted linked list.
//!
//! ## Design Principles
//!
//! - **No Locks**: Every shared mutation is one CAS or one atomic RMW
//! - **Bounded Retries**: Each retry loop has a cap and a defined failure value
//! - **Epoch Reclamation**: Unlinked orders are freed by `crossbeam::epoch`
//! - **Price-Time Priority**: Per symbol book, FIFO at equal price
//!
//! ## Architecture
//!
//! ```text
//! [add_order] --> [SymbolHashIndex: 1024 buckets] --> [SymbolNode]
//!                                                      |        |
//!                                                 [bid book] [ask book]
//!                                                      \        /
//! [match_all] --------------------------------> [MatchingEngine]
//!                                                      |
//!                                         [EventSink] --> [EventLog task]
//! ```

pub mod atomic_slot;
pub mod command;
pub mod config;
pub mod error;
pub mod event_log;
pub mod exchange;
pub mod matching;
pub mod order;
pub mod order_book;
pub mod price;
pub mod replay;
pub mod retry;
pub mod simulation;
pub mod symbol_index;

// Re-exports for convenience
pub use command::{ExchangeEvent, PlaceOrder, Side};
pub use config::EngineConfig;
pub use error::{ConfigError, ExchangeError, ReplayError, SimulationError};
pub use event_log::{EventLog, EventSender, EventSink, NullSink, VecSink};
pub use exchange::{BookSnapshot, Exchange, ExchangeStats};
pub use matching::MatchingEngine;
pub use order::{OrderHandle, OrderView};
pub use order_book::OrderBook;
pub use retry::RetryPolicy;
pub use simulation::{SimulationConfig, SimulationReport};
pub use symbol_index::{SymbolHashIndex, SymbolNode};
