//! Blocking fallback router.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{RouterError, TransportError};
use crate::instrument::Instrumentation;
use crate::poa::PoaPolicy;
use crate::pool::EndpointPool;
use crate::request::{align_batch, JsonRpcRequest, JsonRpcResponse};
use crate::transport::BlockingTransport;

use super::{check_batch_ids, BlockingRouter, Call, Dispatch, Strategy};

/// Tries `pool[0]`, `pool[1]`, … for every request and returns the first
/// answer. Keeps no state between requests, so a recovered primary is used
/// again immediately.
pub struct FallbackProvider<T: ?Sized + BlockingTransport = dyn BlockingTransport> {
    dispatch: Dispatch<T>,
}

impl<T: ?Sized + BlockingTransport> FallbackProvider<T> {
    pub fn new(pool: EndpointPool<T>) -> Self {
        Self {
            dispatch: Dispatch::new(pool),
        }
    }

    pub fn with_instrumentation(mut self, hook: Arc<dyn Instrumentation>) -> Self {
        self.dispatch.set_instrumentation(hook);
        self
    }

    pub fn with_poa_policy(mut self, poa: PoaPolicy) -> Self {
        self.dispatch.set_poa_policy(poa);
        self
    }

    pub fn pool(&self) -> &EndpointPool<T> {
        self.dispatch.pool()
    }

    fn route<R>(
        &self,
        call: Call<'_>,
        attempt: impl Fn(&T) -> Result<R, TransportError>,
        accept: impl Fn(usize, Duration, R) -> Result<R, RouterError>,
    ) -> Result<R, RouterError> {
        let mut failures = Vec::with_capacity(self.dispatch.pool().len());
        for (index, endpoint) in self.dispatch.pool().iter().enumerate() {
            let started = Instant::now();
            match attempt(endpoint.transport().as_ref()) {
                Ok(resp) => return accept(index, started.elapsed(), resp),
                Err(e) => failures.push(self.dispatch.reject(index, call, started.elapsed(), e)),
            }
        }
        Err(self.dispatch.exhausted(failures))
    }
}

impl<T: ?Sized + BlockingTransport> BlockingRouter for FallbackProvider<T> {
    fn send(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, RouterError> {
        self.route(
            Call::single(req),
            |t| t.attempt(req),
            |index, elapsed, resp| self.dispatch.accept(index, req, elapsed, resp),
        )
    }

    fn send_batch(&self, reqs: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>, RouterError> {
        if reqs.is_empty() {
            return Ok(Vec::new());
        }
        check_batch_ids(reqs)?;
        self.route(
            Call::batch(reqs),
            |t| t.attempt_batch(reqs).and_then(|resps| align_batch(reqs, resps)),
            |index, elapsed, resps| self.dispatch.accept_batch(index, reqs, elapsed, resps),
        )
    }

    fn strategy(&self) -> Strategy {
        Strategy::Fallback
    }

    fn endpoint_uris(&self) -> Vec<&str> {
        self.dispatch.pool().uris()
    }
}
