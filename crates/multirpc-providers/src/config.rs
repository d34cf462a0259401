//! Router configuration loadable from JSON.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use multirpc_core::{
    AsyncFallbackProvider, AsyncMultiProvider, BlockingRouter, FallbackProvider, Instrumentation,
    MultiProvider, PoaPolicy, Router, RouterError, Strategy,
};
use multirpc_http::RetryConfig;

use crate::transports::{connect, connect_blocking, TransportOptions};

/// Everything needed to build a router.
///
/// ```json
/// {
///   "endpoints": ["https://eth-mainnet.g.alchemy.com/v2/KEY", "wss://rpc.ankr.com/eth/ws"],
///   "strategy": "failover",
///   "request_timeout_ms": 10000,
///   "poa": { "mode": "sanitize", "max_extra_data_bytes": 32 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub endpoints: Vec<String>,
    pub strategy: Strategy,
    pub request_timeout_ms: u64,
    /// Same-endpoint retries for idempotent HTTP calls. `0` disables them.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub poa: PoaPolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            strategy: Strategy::Failover,
            request_timeout_ms: 30_000,
            max_retries: 0,
            retry_backoff_ms: 125,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 60_000,
            poa: PoaPolicy::default(),
        }
    }
}

impl ProviderConfig {
    pub fn from_json_str(json: &str) -> Result<Self, RouterError> {
        serde_json::from_str(json).map_err(|e| RouterError::Configuration(format!("invalid provider config: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RouterError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RouterError::Configuration(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Transport settings derived from this config.
    pub fn transport_options(&self) -> TransportOptions {
        let timeout = Duration::from_millis(self.request_timeout_ms);
        let mut options = TransportOptions::default();

        options.http.request_timeout = timeout;
        options.http.retry = RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.retry_backoff_ms),
            ..RetryConfig::default()
        };

        options.ws.request_timeout = timeout;
        options.ws.connect_timeout = timeout.min(options.ws.connect_timeout);
        options.ws.reconnect_initial = Duration::from_millis(self.reconnect_initial_ms);
        options.ws.reconnect_max = Duration::from_millis(self.reconnect_max_ms);

        options.ipc.request_timeout = timeout;
        options
    }

    /// Build an async router for the configured strategy.
    pub async fn build_async(
        &self,
        instrumentation: Option<Arc<dyn Instrumentation>>,
    ) -> Result<Box<dyn Router>, RouterError> {
        let pool = connect(&self.endpoints, &self.transport_options()).await?;
        tracing::debug!(strategy = %self.strategy, endpoints = pool.len(), "building async router");
        Ok(match self.strategy {
            Strategy::Failover => {
                let mut router = AsyncMultiProvider::new(pool).with_poa_policy(self.poa);
                if let Some(hook) = instrumentation {
                    router = router.with_instrumentation(hook);
                }
                Box::new(router)
            }
            Strategy::Fallback => {
                let mut router = AsyncFallbackProvider::new(pool).with_poa_policy(self.poa);
                if let Some(hook) = instrumentation {
                    router = router.with_instrumentation(hook);
                }
                Box::new(router)
            }
        })
    }

    /// Build a blocking router for the configured strategy.
    pub fn build_blocking(
        &self,
        instrumentation: Option<Arc<dyn Instrumentation>>,
    ) -> Result<Box<dyn BlockingRouter>, RouterError> {
        let pool = connect_blocking(&self.endpoints, &self.transport_options())?;
        tracing::debug!(strategy = %self.strategy, endpoints = pool.len(), "building blocking router");
        Ok(match self.strategy {
            Strategy::Failover => {
                let mut router = MultiProvider::new(pool).with_poa_policy(self.poa);
                if let Some(hook) = instrumentation {
                    router = router.with_instrumentation(hook);
                }
                Box::new(router)
            }
            Strategy::Fallback => {
                let mut router = FallbackProvider::new(pool).with_poa_policy(self.poa);
                if let Some(hook) = instrumentation {
                    router = router.with_instrumentation(hook);
                }
                Box::new(router)
            }
        })
    }
}
