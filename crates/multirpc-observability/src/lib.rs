//! # multirpc-observability
//!
//! OpenTelemetry metrics and `tracing` setup for multirpc.
//!
//! ## Built-in metrics
//! - `multirpc.rpc_requests`      — counter, tagged with endpoint, outcome, rpc_error_code, network, chain_id
//! - `multirpc.provider_switches` — counter, tagged with from, to, network, chain_id
//! - `multirpc.response_seconds`  — histogram, tagged with endpoint, network, chain_id
//!
//! [`RouterMetrics`] implements [`Instrumentation`](multirpc_core::Instrumentation),
//! so it plugs straight into any router via `with_instrumentation`.
//!
//! ## Structured logging
//! [`init_tracing`] installs a subscriber with per-component levels and
//! optional JSON output.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::{MetricsConfig, RouterMetrics};
pub use tracing_setup::{init_tracing, LogConfig};
