//! Error types.
//!
//! Core failures are values, never panics. Transient CAS failures and the
//! symbol-creation race are handled inside the retry loops and never show
//! up here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by `Exchange::add_order`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// The insertion retry budget ran out under contention. The order was
    /// not linked; resubmitting it is safe.
    #[error("order for {symbol} not inserted after {attempts} attempts")]
    InsertFailure { symbol: String, attempts: u32 },

    /// The bucket CAS budget ran out while creating a new symbol.
    #[error("symbol {symbol} not created after {attempts} attempts")]
    SymbolContention { symbol: String, attempts: u32 },

    #[error("invalid quantity {0}: must be positive")]
    InvalidQuantity(u32),

    #[error("invalid price {0}: must be positive")]
    InvalidPrice(u64),

    #[error("symbol must not be empty")]
    InvalidSymbol,
}

impl ExchangeError {
    /// Whether resubmitting the same order may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::InsertFailure { .. } | ExchangeError::SymbolContention { .. }
        )
    }
}

/// Unrecognized side text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order side {0:?}")]
pub struct UnknownSide(pub String);

/// Errors loading an `EngineConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Errors reading order files for replay.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: {source}")]
    Side {
        row: usize,
        #[source]
        source: UnknownSide,
    },

    #[error("row {row}: bad price {text:?}")]
    Price { row: usize, text: String },
}

/// Errors setting up or reporting a simulation run.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("simulation needs at least one worker")]
    NoWorkers,

    #[error("simulation needs at least one symbol")]
    NoSymbols,

    #[error("empty {0} range")]
    EmptyRange(&'static str),

    #[error("latency histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),

    #[error("merging latency histograms: {0}")]
    Merge(#[from] hdrhistogram::AdditionError),
}
