//! Async failover router.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use crate::error::{RouterError, TransportError};
use crate::instrument::Instrumentation;
use crate::poa::PoaPolicy;
use crate::pool::EndpointPool;
use crate::request::{align_batch, JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

use super::cursor::{Cursor, Scan};
use super::{check_batch_ids, Call, Dispatch, Router, Strategy};

/// Non-blocking [`MultiProvider`](super::MultiProvider).
///
/// Safe to share between tasks. The cursor is an atomic moved only by
/// compare-and-swap after an attempt has resolved, so:
///
/// - concurrent requests that see the same endpoint fail advance it once;
/// - nothing is locked while a request awaits its transport;
/// - dropping a `send` future mid-flight cancels the transport call and
///   leaves the cursor where it was.
pub struct AsyncMultiProvider<T: ?Sized + RpcTransport = dyn RpcTransport> {
    dispatch: Dispatch<T>,
    cursor: Cursor,
}

impl<T: ?Sized + RpcTransport> AsyncMultiProvider<T> {
    pub fn new(pool: EndpointPool<T>) -> Self {
        let cursor = Cursor::new(pool.len());
        Self {
            dispatch: Dispatch::new(pool),
            cursor,
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

    pub fn current_index(&self) -> usize {
        self.cursor.get()
    }

    pub fn current_endpoint_uri(&self) -> &str {
        self.dispatch.endpoint(self.cursor.get()).uri()
    }

    async fn route<'a, R>(
        &'a self,
        call: Call<'_>,
        attempt: impl Fn(&'a T) -> BoxFuture<'a, Result<R, TransportError>>,
        accept: impl Fn(usize, Duration, R) -> Result<R, RouterError>,
    ) -> Result<R, RouterError> {
        let mut scan = Scan::new(self.dispatch.pool().len());

        while let Some((observed, index)) = scan.next(&self.cursor) {
            let transport = self.dispatch.endpoint(index).transport().as_ref();
            let started = Instant::now();
            let outcome = attempt(transport).await;
            match outcome {
                Ok(resp) => {
                    if self.cursor.settle(observed, index) {
                        self.dispatch.switched(observed, index);
                    }
                    return accept(index, started.elapsed(), resp);
                }
                Err(e) => {
                    let failure = self.dispatch.reject(index, call, started.elapsed(), e);
                    scan.failures.push(failure);
                    if scan.may_advance_from(index) {
                        if let Some(next) = self.cursor.advance(index) {
                            self.dispatch.switched(index, next);
                        }
                    }
                }
            }
        }

        Err(self.dispatch.exhausted(scan.failures))
    }
}

#[async_trait]
impl<T: ?Sized + RpcTransport> Router for AsyncMultiProvider<T> {
    async fn send(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, RouterError> {
        self.route(
            Call::single(req),
            |t| t.attempt(req),
            |index, elapsed, resp| self.dispatch.accept(index, req, elapsed, resp),
        )
        .await
    }

    async fn send_batch(&self, reqs: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>, RouterError> {
        if reqs.is_empty() {
            return Ok(Vec::new());
        }
        check_batch_ids(reqs)?;
        self.route(
            Call::batch(reqs),
            |t| async move { align_batch(reqs, t.attempt_batch(reqs).await?) }.boxed(),
            |index, elapsed, resps| self.dispatch.accept_batch(index, reqs, elapsed, resps),
        )
        .await
    }

    fn strategy(&self) -> Strategy {
        Strategy::Failover
    }

    fn endpoint_uris(&self) -> Vec<&str> {
        self.dispatch.pool().uris()
    }
}
