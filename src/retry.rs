//! Retry bounds and progressive backoff.

use std::thread;
use std::time::Duration;

use crossbeam::utils::Backoff;

use crate::config::EngineConfig;

/// Iteration caps for every CAS loop in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub insert_attempts: u32,
    pub symbol_attempts: u32,
    pub match_iterations: usize,
    pub reserve_spins: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        EngineConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> ProgressiveBackoff {
        ProgressiveBackoff {
            spin: Backoff::new(),
            rounds: 0,
            base: self.backoff_base,
            cap: self.backoff_cap,
        }
    }
}

/// Delay between failed insertion attempts.
///
/// Spins and yields first (crossbeam `Backoff`), then sleeps for
/// `base * n` where `n` counts the sleeping rounds, capped at `cap`.
#[derive(Debug)]
pub struct ProgressiveBackoff {
    spin: Backoff,
    rounds: u32,
    base: Duration,
    cap: Duration,
}

impl ProgressiveBackoff {
    pub fn wait(&mut self) {
        if !self.spin.is_completed() {
            self.spin.snooze();
            return;
        }
        self.rounds = self.rounds.saturating_add(1);
        thread::sleep(self.current_delay());
    }

    /// Sleep the next `wait` would use, once spinning is done
    pub fn current_delay(&self) -> Duration {
        self.base.saturating_mul(self.rounds.max(1)).min(self.cap)
    }

    /// Number of sleeping rounds so far
    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spins_before_sleeping() {
        let policy = RetryPolicy {
            backoff_base: Duration::from_micros(1),
            backoff_cap: Duration::from_micros(4),
            ..RetryPolicy::default()
        };
        let mut backoff = policy.backoff();
        backoff.wait();
        assert_eq!(backoff.rounds(), 0);
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            backoff_base: Duration::from_micros(1),
            backoff_cap: Duration::from_micros(3),
            ..RetryPolicy::default()
        };
        let mut backoff = policy.backoff();
        let mut delays = Vec::new();
        for _ in 0..64 {
            backoff.wait();
            if backoff.rounds() > 0 {
                delays.push(backoff.current_delay());
            }
        }
        assert!(!delays.is_empty());
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), Duration::from_micros(3));
    }
}
