//! Request routers over an [`EndpointPool`].
//!
//! ```text
//!                 ┌──────────────────── failover ────────────────────┐
//! caller → send → │ cursor ─► pool[i] ─ fail ─► CAS i→i+1 ─► pool[i+1] │ → response
//!                 └──────────────────────────────────────────────────┘
//!                 ┌──────────────────── fallback ────────────────────┐
//! caller → send → │ pool[0] ─ fail ─► pool[1] ─ fail ─► … pool[n-1]   │ → response
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! Only [`TransportError`]s move a router to another endpoint. JSON-RPC error
//! objects and PoA validation failures are returned to the caller from the
//! endpoint that produced them.

mod async_failover;
mod async_fallback;
mod cursor;
mod failover;
mod fallback;

pub use async_failover::AsyncMultiProvider;
pub use async_fallback::AsyncFallbackProvider;
pub use failover::MultiProvider;
pub use fallback::FallbackProvider;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::endpoint::redact;
use crate::error::{EndpointFailure, RouterError, TransportError};
use crate::instrument::{Attempt, AttemptOutcome, Hook, Instrumentation};
use crate::poa::PoaPolicy;
use crate::pool::{EndpointDescriptor, EndpointPool};
use crate::request::{next_request_id, JsonRpcRequest, JsonRpcResponse};

/// Endpoint selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Stick with one endpoint until it fails, then move to the next.
    #[default]
    Failover,
    /// Start from the first endpoint on every request.
    Fallback,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failover => write!(f, "failover"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "failover" | "multi" => Ok(Self::Failover),
            "fallback" | "broadcast" => Ok(Self::Fallback),
            other => Err(RouterError::Configuration(format!("unknown strategy: {other}"))),
        }
    }
}

/// Async router interface, so either strategy can sit behind one type.
#[async_trait]
pub trait Router: Send + Sync {
    async fn send(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, RouterError>;

    /// Send a batch as a single attempt per endpoint. Error objects inside
    /// the batch are left in their responses.
    async fn send_batch(&self, reqs: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>, RouterError>;

    fn strategy(&self) -> Strategy;

    /// Configured endpoint URIs in pool order.
    fn endpoint_uris(&self) -> Vec<&str>;

    /// Call `method` and return the raw result value.
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, RouterError> {
        let req = JsonRpcRequest::new(next_request_id(), method, params);
        Ok(self.send(&req).await?.result.unwrap_or(Value::Null))
    }

    /// Call `method` and decode the result.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T, RouterError>
    where
        Self: Sized,
    {
        let value = self.request(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Blocking router interface.
pub trait BlockingRouter: Send + Sync {
    fn send(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, RouterError>;

    fn send_batch(&self, reqs: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>, RouterError>;

    fn strategy(&self) -> Strategy;

    fn endpoint_uris(&self) -> Vec<&str>;

    fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, RouterError> {
        let req = JsonRpcRequest::new(next_request_id(), method, params);
        Ok(self.send(&req)?.result.unwrap_or(Value::Null))
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T, RouterError>
    where
        Self: Sized,
    {
        let value = self.request(method, params)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// What a router is sending, as reported to logs and instrumentation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Call<'a> {
    method: &'a str,
    batch_size: Option<usize>,
}

impl<'a> Call<'a> {
    pub(crate) fn single(req: &'a JsonRpcRequest) -> Self {
        Self {
            method: &req.method,
            batch_size: None,
        }
    }

    pub(crate) fn batch(reqs: &'a [JsonRpcRequest]) -> Self {
        Self {
            method: "batch",
            batch_size: Some(reqs.len()),
        }
    }
}

/// Batches are matched back to their requests by id, so ids must be unique.
fn check_batch_ids(reqs: &[JsonRpcRequest]) -> Result<(), RouterError> {
    let mut seen = HashSet::with_capacity(reqs.len());
    match reqs.iter().find(|req| !seen.insert(&req.id)) {
        Some(dup) => Err(RouterError::Configuration(format!("duplicate request id {} in batch", dup.id))),
        None => Ok(()),
    }
}

/// Pool plus the per-attempt bookkeeping every router shares: outcome
/// classification, PoA post-processing, logging and instrumentation.
pub(crate) struct Dispatch<T: ?Sized> {
    pool: EndpointPool<T>,
    hook: Hook,
    poa: PoaPolicy,
}

impl<T: ?Sized> Dispatch<T> {
    fn new(pool: EndpointPool<T>) -> Self {
        Self {
            pool,
            hook: Hook::default(),
            poa: PoaPolicy::default(),
        }
    }

    fn set_instrumentation(&mut self, hook: Arc<dyn Instrumentation>) {
        self.hook = Hook::new(hook);
    }

    fn set_poa_policy(&mut self, poa: PoaPolicy) {
        self.poa = poa;
    }

    fn pool(&self) -> &EndpointPool<T> {
        &self.pool
    }

    fn endpoint(&self, index: usize) -> &EndpointDescriptor<T> {
        &self.pool[index]
    }

    fn switched(&self, from: usize, to: usize) {
        let (from, to) = (self.pool[from].name(), self.pool[to].name());
        tracing::info!(from, to, "switched active provider");
        self.hook.switch(from, to);
    }

    fn report(&self, index: usize, call: Call<'_>, outcome: AttemptOutcome, elapsed: Duration) {
        self.hook.attempt(&Attempt {
            endpoint: self.pool[index].name(),
            method: call.method,
            batch_size: call.batch_size,
            outcome,
            elapsed,
        });
    }

    /// Classify a response that arrived from `pool[index]`.
    fn accept(
        &self,
        index: usize,
        req: &JsonRpcRequest,
        elapsed: Duration,
        mut resp: JsonRpcResponse,
    ) -> Result<JsonRpcResponse, RouterError> {
        let endpoint = self.pool[index].name();
        let call = Call::single(req);
        if let Some(error) = resp.error.take() {
            self.report(index, call, AttemptOutcome::ApplicationError { code: error.code }, elapsed);
            tracing::debug!(endpoint, method = %req.method, code = error.code, "node returned an error object");
            return Err(RouterError::Application {
                endpoint: endpoint.to_string(),
                error,
            });
        }
        self.report(index, call, AttemptOutcome::Success, elapsed);
        self.poa
            .apply(&req.method, &mut resp)
            .map_err(|reason| RouterError::Validation {
                endpoint: endpoint.to_string(),
                reason,
            })?;
        tracing::debug!(endpoint, method = %req.method, params = ?req.params, "request answered");
        Ok(resp)
    }

    /// Classify a batch from `pool[index]`. `resps` must already be in
    /// request order (see [`align_batch`](crate::request::align_batch)).
    fn accept_batch(
        &self,
        index: usize,
        reqs: &[JsonRpcRequest],
        elapsed: Duration,
        mut resps: Vec<JsonRpcResponse>,
    ) -> Result<Vec<JsonRpcResponse>, RouterError> {
        let endpoint = self.pool[index].name();
        self.report(index, Call::batch(reqs), AttemptOutcome::Success, elapsed);
        for (req, resp) in reqs.iter().zip(resps.iter_mut()) {
            if resp.is_error() {
                continue;
            }
            self.poa
                .apply(&req.method, resp)
                .map_err(|reason| RouterError::Validation {
                    endpoint: endpoint.to_string(),
                    reason,
                })?;
        }
        tracing::debug!(endpoint, size = reqs.len(), "batch answered");
        Ok(resps)
    }

    /// Record a transport failure from `pool[index]`.
    fn reject(&self, index: usize, call: Call<'_>, elapsed: Duration, error: TransportError) -> EndpointFailure {
        let slot = &self.pool[index];
        self.report(index, call, AttemptOutcome::TransportFailure, elapsed);
        let error = scrub(error, slot.uri());
        tracing::warn!(endpoint = slot.name(), method = call.method, error = %error, "provider not responding");
        EndpointFailure {
            endpoint: slot.name().to_string(),
            error,
        }
    }

    fn exhausted(&self, failures: Vec<EndpointFailure>) -> RouterError {
        tracing::debug!(attempts = failures.len(), "no active provider available");
        RouterError::NoActiveProvider { failures }
    }
}

/// Remove the endpoint URI from transport error text.
fn scrub(error: TransportError, uri: &str) -> TransportError {
    match error {
        TransportError::Http(m) => TransportError::Http(redact(&m, uri)),
        TransportError::WebSocket(m) => TransportError::WebSocket(redact(&m, uri)),
        TransportError::Ipc(m) => TransportError::Ipc(redact(&m, uri)),
        TransportError::Malformed(m) => TransportError::Malformed(redact(&m, uri)),
        TransportError::Other(m) => TransportError::Other(redact(&m, uri)),
        TransportError::Status { status, body } => TransportError::Status {
            status,
            body: redact(&body, uri),
        },
        e @ TransportError::Timeout { .. } => e,
    }
}
