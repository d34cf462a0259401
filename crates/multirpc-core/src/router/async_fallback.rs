//! Async fallback router.

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

use super::{check_batch_ids, Call, Dispatch, Router, Strategy};

/// Non-blocking [`FallbackProvider`](super::FallbackProvider).
///
/// Each request awaits its endpoints one after another in pool order.
/// Concurrent requests each run their own scan.
pub struct AsyncFallbackProvider<T: ?Sized + RpcTransport = dyn RpcTransport> {
    dispatch: Dispatch<T>,
}

impl<T: ?Sized + RpcTransport> AsyncFallbackProvider<T> {
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

    async fn route<'a, R>(
        &'a self,
        call: Call<'_>,
        attempt: impl Fn(&'a T) -> BoxFuture<'a, Result<R, TransportError>>,
        accept: impl Fn(usize, Duration, R) -> Result<R, RouterError>,
    ) -> Result<R, RouterError> {
        let mut failures = Vec::with_capacity(self.dispatch.pool().len());
        for (index, endpoint) in self.dispatch.pool().iter().enumerate() {
            let started = Instant::now();
            match attempt(endpoint.transport().as_ref()).await {
                Ok(resp) => return accept(index, started.elapsed(), resp),
                Err(e) => failures.push(self.dispatch.reject(index, call, started.elapsed(), e)),
            }
        }
        Err(self.dispatch.exhausted(failures))
    }
}

#[async_trait]
impl<T: ?Sized + RpcTransport> Router for AsyncFallbackProvider<T> {
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
        Strategy::Fallback
    }

    fn endpoint_uris(&self) -> Vec<&str> {
        self.dispatch.pool().uris()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::router::testing::{
        block_request, chain_and_block, header_with_extra_data, ok, pool_of, MockEndpoint, Reply, ReversingEndpoint,
    };

    #[tokio::test]
    async fn first_success_wins_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = MockEndpoint::new("http://10.0.0.1:8545", Reply::Down, &log);
        let b = MockEndpoint::new("http://10.0.0.2:8545", Reply::Down, &log);
        let c = MockEndpoint::new("http://10.0.0.3:8545", ok("c"), &log);
        let provider = AsyncFallbackProvider::new(pool_of(&[a.clone(), b.clone(), c.clone()]));

        let resp = provider.send(&block_request()).await.unwrap();
        assert_eq!(resp.result.unwrap(), "c");
        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["http://10.0.0.1:8545", "http://10.0.0.2:8545", "http://10.0.0.3:8545"]
        );
    }

    #[tokio::test]
    async fn all_down_reports_each_reason() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let endpoints: Vec<_> = (1..=3)
            .map(|i| MockEndpoint::new(&format!("http://10.0.0.{i}:8545"), Reply::Down, &log))
            .collect();
        let provider = AsyncFallbackProvider::new(pool_of(&endpoints));

        let err = provider.send(&block_request()).await.unwrap_err();
        let failures = err.failures();
        assert_eq!(failures.len(), 3);
        for (i, failure) in failures.iter().enumerate() {
            assert_eq!(failure.endpoint, format!("10.0.0.{}:8545", i + 1));
            assert!(matches!(failure.error, TransportError::Http(_)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_broadcasts_keep_their_own_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = MockEndpoint::with_delay("http://10.0.0.1:8545", Reply::Down, Duration::from_millis(5), &log);
        let b = MockEndpoint::with_delay("http://10.0.0.2:8545", ok("b"), Duration::from_millis(5), &log);
        let provider = Arc::new(AsyncFallbackProvider::new(pool_of(&[a.clone(), b.clone()])));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.send(&block_request()).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().result.unwrap(), "b");
        }
        // no shared cursor: every request paid for the primary first
        assert_eq!(a.calls(), 16);
        assert_eq!(b.calls(), 16);
    }

    #[tokio::test]
    async fn application_error_is_final() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = MockEndpoint::new("http://10.0.0.1:8545", Reply::RpcError(-32000), &log);
        let b = MockEndpoint::new("http://10.0.0.2:8545", ok("b"), &log);
        let provider = AsyncFallbackProvider::new(pool_of(&[a, b.clone()]));

        let err = provider.send(&block_request()).await.unwrap_err();
        assert!(matches!(err, RouterError::Application { .. }));
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn oversize_extra_data_in_reordered_batch_is_rejected() {
        let a = ReversingEndpoint::new("http://10.0.0.1:8545", header_with_extra_data(97));
        let provider = AsyncFallbackProvider::new(pool_of(&[a]));

        let err = provider.send_batch(&chain_and_block()).await.unwrap_err();
        assert!(matches!(err, RouterError::Validation { .. }), "{err:?}");
    }
}
