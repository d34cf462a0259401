//! Router metrics.
//!
//! All metrics use OpenTelemetry conventions and can be exported to
//! Prometheus, Grafana, Datadog, etc. by whatever meter provider the
//! application installs.

use std::collections::HashMap;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};

use multirpc_core::{Attempt, AttemptOutcome, Instrumentation};

/// Metric naming and chain labelling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prefix for every metric name.
    pub namespace: String,
    /// Chain the routers talk to, if known. Labels are `"unknown"` otherwise.
    pub chain_id: Option<u64>,
    pub chain_id_to_name: HashMap<u64, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let chain_id_to_name = [
            (1, "ethereum"),
            (10, "optimism"),
            (137, "polygon"),
            (42161, "arbitrum"),
            (100, "gnosis"),
            (10200, "chiado"),
            (11155111, "sepolia"),
            (560048, "hoodi"),
            (17000, "holesky"),
        ]
        .into_iter()
        .map(|(id, name)| (id, name.to_string()))
        .collect();

        Self {
            namespace: "multirpc".into(),
            chain_id: None,
            chain_id_to_name,
        }
    }
}

impl MetricsConfig {
    /// Network name for the configured chain.
    pub fn network(&self) -> &str {
        self.chain_id
            .and_then(|id| self.chain_id_to_name.get(&id))
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    fn metric(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{name}", self.namespace)
        }
    }
}

/// Metrics handle for routers.
#[derive(Clone)]
pub struct RouterMetrics {
    pub rpc_requests: Counter<u64>,
    pub provider_switches: Counter<u64>,
    pub response_seconds: Histogram<f64>,
    pub batch_size: Histogram<u64>,
    chain: [KeyValue; 2],
}

impl RouterMetrics {
    pub fn new(meter: &Meter, config: &MetricsConfig) -> Self {
        let chain_id = config
            .chain_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".into());

        Self {
            rpc_requests: meter
                .u64_counter(config.metric("rpc_requests"))
                .with_description("RPC attempts per endpoint, by outcome")
                .build(),
            provider_switches: meter
                .u64_counter(config.metric("provider_switches"))
                .with_description("Times a failover router moved to another endpoint")
                .build(),
            response_seconds: meter
                .f64_histogram(config.metric("response_seconds"))
                .with_description("Distribution of RPC response times in seconds")
                .with_unit("s")
                .build(),
            batch_size: meter
                .u64_histogram(config.metric("batch_size"))
                .with_description("Number of JSON-RPC calls bundled in each batch attempt")
                .build(),
            chain: [
                KeyValue::new("network", config.network().to_string()),
                KeyValue::new("chain_id", chain_id),
            ],
        }
    }

    fn attempt_labels(&self, attempt: &Attempt<'_>) -> Vec<KeyValue> {
        let code = match attempt.outcome {
            AttemptOutcome::ApplicationError { code } => code.to_string(),
            _ => String::new(),
        };
        let mut labels = vec![
            KeyValue::new("endpoint", attempt.endpoint.to_string()),
            KeyValue::new("method", attempt.method.to_string()),
            KeyValue::new("outcome", attempt.outcome.as_str()),
            KeyValue::new("rpc_error_code", code),
        ];
        labels.extend(self.chain.iter().cloned());
        labels
    }

    fn endpoint_labels(&self, endpoint: &str) -> Vec<KeyValue> {
        let mut labels = vec![KeyValue::new("endpoint", endpoint.to_string())];
        labels.extend(self.chain.iter().cloned());
        labels
    }
}

impl Instrumentation for RouterMetrics {
    fn on_attempt(&self, attempt: &Attempt<'_>) {
        self.rpc_requests.add(1, &self.attempt_labels(attempt));

        let labels = self.endpoint_labels(attempt.endpoint);
        self.response_seconds.record(attempt.elapsed.as_secs_f64(), &labels);
        if let Some(size) = attempt.batch_size {
            self.batch_size.record(size as u64, &labels);
        }
    }

    fn on_switch(&self, from: &str, to: &str) {
        let mut labels = vec![
            KeyValue::new("from", from.to_string()),
            KeyValue::new("to", to.to_string()),
        ];
        labels.extend(self.chain.iter().cloned());
        self.provider_switches.add(1, &labels);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn metrics(chain_id: Option<u64>) -> RouterMetrics {
        let meter = opentelemetry::global::meter("multirpc-test");
        RouterMetrics::new(
            &meter,
            &MetricsConfig {
                chain_id,
                ..MetricsConfig::default()
            },
        )
    }

    #[test]
    fn known_chain_gets_its_name() {
        let config = MetricsConfig {
            chain_id: Some(100),
            ..MetricsConfig::default()
        };
        assert_eq!(config.network(), "gnosis");
        assert_eq!(MetricsConfig::default().network(), "unknown");
    }

    #[test]
    fn namespace_prefixes_names() {
        assert_eq!(MetricsConfig::default().metric("rpc_requests"), "multirpc.rpc_requests");
        let bare = MetricsConfig {
            namespace: String::new(),
            ..MetricsConfig::default()
        };
        assert_eq!(bare.metric("rpc_requests"), "rpc_requests");
    }

    fn attempt(method: &str, outcome: AttemptOutcome) -> Attempt<'_> {
        Attempt {
            endpoint: "alchemy.com",
            method,
            batch_size: None,
            outcome,
            elapsed: Duration::ZERO,
        }
    }

    fn label(labels: &[KeyValue], key: &str) -> String {
        labels
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.as_str().into_owned())
            .unwrap_or_default()
    }

    #[test]
    fn attempt_labels_carry_error_code_and_chain() {
        let m = metrics(Some(1));
        let labels = m.attempt_labels(&attempt("eth_call", AttemptOutcome::ApplicationError { code: -32000 }));
        assert_eq!(label(&labels, "endpoint"), "alchemy.com");
        assert_eq!(label(&labels, "method"), "eth_call");
        assert_eq!(label(&labels, "outcome"), "rpc_error");
        assert_eq!(label(&labels, "rpc_error_code"), "-32000");
        assert_eq!(label(&labels, "network"), "ethereum");
        assert_eq!(label(&labels, "chain_id"), "1");

        let ok = m.attempt_labels(&attempt("eth_chainId", AttemptOutcome::Success));
        assert_eq!(label(&ok, "outcome"), "success");
        assert_eq!(label(&ok, "rpc_error_code"), "");
    }

    #[test]
    fn recording_without_a_provider_is_harmless() {
        let m = metrics(None);
        m.on_attempt(&Attempt {
            batch_size: Some(20),
            elapsed: Duration::from_millis(12),
            ..attempt("batch", AttemptOutcome::TransportFailure)
        });
        m.on_switch("ankr.com", "alchemy.com");
    }
}
