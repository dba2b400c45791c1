//! Engine configuration.
//!
//! Every retry loop in the exchange is bounded by a value from here.
//! Loaded from TOML; missing keys fall back to the defaults.
//!
//! ```toml
//! insert_retries = 50
//! match_iterations = 1000
//! backoff_base_us = 500
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Attempts to link an order before `add_order` reports failure
    pub insert_retries: u32,
    /// Attempts to publish a new symbol in its bucket
    pub symbol_retries: u32,
    /// Outer iterations of one `match_symbol` call
    pub match_iterations: usize,
    /// CAS attempts when reserving quantity on an order
    pub reserve_spins: u32,
    /// First sleep once spinning backoff is exhausted (microseconds)
    pub backoff_base_us: u64,
    /// Upper bound for a single backoff sleep (microseconds)
    pub backoff_cap_us: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            insert_retries: 50,
            symbol_retries: 1024,
            match_iterations: 1000,
            reserve_spins: 64,
            backoff_base_us: 500,
            backoff_cap_us: 100_000,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        log::debug!("loaded engine config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("insert_retries", self.insert_retries as u64),
            ("symbol_retries", self.symbol_retries as u64),
            ("match_iterations", self.match_iterations as u64),
            ("reserve_spins", self.reserve_spins as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero",
                });
            }
        }
        if self.backoff_base_us > self.backoff_cap_us {
            return Err(ConfigError::Invalid {
                field: "backoff_base_us",
                reason: "must not exceed backoff_cap_us",
            });
        }
        Ok(())
    }

    /// Retry bounds handed to the book and the matcher
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            insert_attempts: self.insert_retries,
            symbol_attempts: self.symbol_retries,
            match_iterations: self.match_iterations,
            reserve_spins: self.reserve_spins,
            backoff_base: Duration::from_micros(self.backoff_base_us),
            backoff_cap: Duration::from_micros(self.backoff_cap_us),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("insert_retries = 7\nbackoff_cap_us = 2000\n").unwrap();
        assert_eq!(config.insert_retries, 7);
        assert_eq!(config.backoff_cap_us, 2000);
        assert_eq!(config.match_iterations, 1000);

        let policy = config.retry_policy();
        assert_eq!(policy.insert_attempts, 7);
        assert_eq!(policy.backoff_cap, Duration::from_millis(2));
    }

    #[test]
    fn test_rejects_zero_budget() {
        let err = EngineConfig::from_toml_str("match_iterations = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "match_iterations", .. }
        ));
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let err = EngineConfig::from_toml_str("backoff_base_us = 10\nbackoff_cap_us = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "backoff_base_us", .. }));
    }

    #[test]
    fn test_rejects_unknown_key() {
        assert!(matches!(
            EngineConfig::from_toml_str("retries = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_toml_file("/nonexistent/engine.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
