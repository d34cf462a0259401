//! Instrumentation hook.
//!
//! Routers report every transport attempt and every cursor switch to an
//! optional [`Instrumentation`]. Hooks run synchronously on the request
//! path, so they must be cheap and must not block. A hook that panics is
//! caught and logged; the request it was reporting on is unaffected.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Classification of one transport attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The endpoint returned a result.
    Success,
    /// The endpoint returned a JSON-RPC error object.
    ApplicationError { code: i64 },
    /// The endpoint could not be reached or did not speak the protocol.
    TransportFailure,
}

impl AttemptOutcome {
    /// Label used by log lines and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ApplicationError { .. } => "rpc_error",
            Self::TransportFailure => "fail",
        }
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transport attempt, as reported to [`Instrumentation::on_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt<'a> {
    /// Display name of the endpoint.
    pub endpoint: &'a str,
    /// JSON-RPC method, or `"batch"` for a batch.
    pub method: &'a str,
    /// Number of requests in the batch. `None` for a single request.
    pub batch_size: Option<usize>,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

/// Side channel for router events. All methods default to no-ops.
///
/// Endpoint arguments are display names (see
/// [`display_name`](crate::endpoint::display_name)), never raw URIs.
pub trait Instrumentation: Send + Sync {
    fn on_attempt(&self, _attempt: &Attempt<'_>) {}

    fn on_switch(&self, _from: &str, _to: &str) {}
}

/// Logs every attempt through `tracing` at `trace`. Switches are already
/// logged by the routers at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInstrumentation;

impl Instrumentation for TracingInstrumentation {
    fn on_attempt(&self, attempt: &Attempt<'_>) {
        tracing::trace!(
            endpoint = attempt.endpoint,
            method = attempt.method,
            batch_size = attempt.batch_size,
            outcome = %attempt.outcome,
            elapsed_ms = attempt.elapsed.as_millis() as u64,
            "rpc attempt"
        );
    }
}

/// Optional hook as stored by the routers.
#[derive(Clone, Default)]
pub(crate) struct Hook(Option<Arc<dyn Instrumentation>>);

impl Hook {
    pub(crate) fn new(inner: Arc<dyn Instrumentation>) -> Self {
        Self(Some(inner))
    }

    pub(crate) fn attempt(&self, attempt: &Attempt<'_>) {
        if let Some(hook) = &self.0 {
            guarded("on_attempt", || hook.on_attempt(attempt));
        }
    }

    pub(crate) fn switch(&self, from: &str, to: &str) {
        if let Some(hook) = &self.0 {
            guarded("on_switch", || hook.on_switch(from, to));
        }
    }
}

fn guarded(callback: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(callback, "instrumentation hook panicked; ignoring");
    }
}
