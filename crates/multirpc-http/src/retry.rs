//! Exception retry for a single endpoint.
//!
//! Retries happen inside one transport attempt, so a router still sees one
//! attempt per endpoint. Only methods that are safe to repeat are retried.

use std::time::Duration;

/// Method prefixes that are safe to send twice.
const IDEMPOTENT_PREFIXES: &[&str] = &[
    "web3_",
    "net_",
    "txpool_",
    "eth_blockNumber",
    "eth_call",
    "eth_chainId",
    "eth_estimateGas",
    "eth_feeHistory",
    "eth_gasPrice",
    "eth_get",
    "eth_maxPriorityFeePerGas",
    "eth_protocolVersion",
    "eth_syncing",
];

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first try. `0` disables retrying.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Caps exponential growth.
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(125),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// Stateless retry policy: computes the next delay given the attempt number.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Whether `method` may be retried at all.
    pub fn covers(&self, method: &str) -> bool {
        self.config.max_retries > 0 && IDEMPOTENT_PREFIXES.iter().any(|p| method.starts_with(p))
    }

    /// Whether a batch may be retried: every method in it must be covered.
    pub fn covers_all<'a>(&self, mut methods: impl Iterator<Item = &'a str>) -> bool {
        methods.all(|m| self.covers(m))
    }

    /// Delay before the `attempt`-th retry (1-based), or `None` once
    /// `max_retries` is used up.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let base_ms =
            self.config.initial_backoff.as_millis() as f64 * self.config.multiplier.powi(attempt as i32 - 1);
        let capped = base_ms.min(self.config.max_backoff.as_millis() as f64);
        Some(Duration::from_millis(capped as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            multiplier: 2.0,
        })
    }

    #[test]
    fn delays_double_then_cap() {
        let p = policy(4);
        assert_eq!(p.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(p.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(p.next_delay(3), Some(Duration::from_millis(350)));
        assert_eq!(p.next_delay(5), None);
    }

    #[test]
    fn only_idempotent_methods_are_covered() {
        let p = policy(2);
        assert!(p.covers("eth_getBlockByNumber"));
        assert!(p.covers("eth_call"));
        assert!(p.covers("net_version"));
        assert!(!p.covers("eth_sendRawTransaction"));
        assert!(!p.covers("eth_sign"));
        assert!(p.covers_all(["eth_chainId", "eth_getLogs"].into_iter()));
        assert!(!p.covers_all(["eth_chainId", "eth_sendTransaction"].into_iter()));
    }

    #[test]
    fn zero_retries_disables() {
        let p = policy(0);
        assert!(!p.covers("eth_call"));
        assert_eq!(p.next_delay(1), None);
    }
}
