//! Blocking failover router.

use std::sync::Arc;
use std::time::Instant;

use crate::error::RouterError;
use crate::instrument::Instrumentation;
use crate::poa::PoaPolicy;
use crate::pool::EndpointPool;
use crate::request::{align_batch, JsonRpcRequest, JsonRpcResponse};
use crate::transport::BlockingTransport;

use super::cursor::{Cursor, Scan};
use super::{check_batch_ids, BlockingRouter, Call, Dispatch, Strategy};

/// Sends every request to the current endpoint and moves on to the next one
/// when it fails. The endpoint that answers becomes the current one for
/// subsequent requests.
///
/// One request makes at most one attempt per endpoint. When all of them
/// fail the request returns [`RouterError::NoActiveProvider`] and the cursor
/// stays on the last endpoint tried, so the next request resumes from there.
///
/// # Example
/// ```rust,no_run
/// # use multirpc_core::{MultiProvider, EndpointPool, BlockingTransport};
/// # fn demo(pool: EndpointPool<dyn BlockingTransport>) -> Result<(), multirpc_core::RouterError> {
/// use multirpc_core::BlockingRouter;
///
/// let provider = MultiProvider::new(pool);
/// let block: String = provider.call("eth_blockNumber", vec![])?;
/// println!("{block} via {}", provider.current_endpoint_uri());
/// # Ok(())
/// # }
/// ```
pub struct MultiProvider<T: ?Sized + BlockingTransport = dyn BlockingTransport> {
    dispatch: Dispatch<T>,
    cursor: Cursor,
}

impl<T: ?Sized + BlockingTransport> MultiProvider<T> {
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

    /// Index of the endpoint the next request goes to first.
    pub fn current_index(&self) -> usize {
        self.cursor.get()
    }

    /// URI of the endpoint the next request goes to first.
    pub fn current_endpoint_uri(&self) -> &str {
        self.dispatch.endpoint(self.cursor.get()).uri()
    }

    fn route<R>(
        &self,
        call: Call<'_>,
        attempt: impl Fn(&T) -> Result<R, crate::error::TransportError>,
        accept: impl Fn(usize, std::time::Duration, R) -> Result<R, RouterError>,
    ) -> Result<R, RouterError> {
        let mut scan = Scan::new(self.dispatch.pool().len());

        while let Some((observed, index)) = scan.next(&self.cursor) {
            let endpoint = self.dispatch.endpoint(index);
            let started = Instant::now();
            match attempt(endpoint.transport().as_ref()) {
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

impl<T: ?Sized + BlockingTransport> BlockingRouter for MultiProvider<T> {
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
        Strategy::Failover
    }

    fn endpoint_uris(&self) -> Vec<&str> {
        self.dispatch.pool().uris()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::instrument::AttemptOutcome;
    use crate::instrument::TracingInstrumentation;
    use crate::router::testing::{
        block_request, capture_logs, chain_and_block, header_with_extra_data, ok, pool_of, Events, MockEndpoint,
        Reply, ReversingEndpoint,
    };

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn healthy_primary_serves_everything() {
        let log = log();
        let a = MockEndpoint::new("http://127.0.0.1:9000", ok("a"), &log);
        let b = MockEndpoint::new("http://127.0.0.1:9001", ok("b"), &log);
        let provider = MultiProvider::new(pool_of(&[a.clone(), b.clone()]));

        for _ in 0..3 {
            let resp = provider.send(&block_request()).unwrap();
            assert_eq!(resp.result.unwrap(), "a");
        }
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 0);
        assert_eq!(provider.current_index(), 0);
    }

    #[test]
    fn failure_moves_cursor_and_it_sticks() {
        let log = log();
        let a = MockEndpoint::new("http://127.0.0.1:9001", Reply::Down, &log);
        let b = MockEndpoint::new("http://127.0.0.1:9000", ok("b"), &log);
        let events = Arc::new(Events::default());
        let provider = MultiProvider::new(pool_of(&[a.clone(), b.clone()]))
            .with_instrumentation(events.clone());

        assert_eq!(provider.send(&block_request()).unwrap().result.unwrap(), "b");
        assert_eq!(provider.current_index(), 1);
        assert_eq!(provider.current_endpoint_uri(), "http://127.0.0.1:9000");

        // second request goes straight to the survivor
        assert_eq!(provider.send(&block_request()).unwrap().result.unwrap(), "b");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 2);

        let switches = events.switches.lock().unwrap();
        assert_eq!(*switches, vec![("127.0.0.1:9001".to_string(), "127.0.0.1:9000".to_string())]);
    }

    #[test]
    fn at_most_one_attempt_per_endpoint() {
        let log = log();
        let endpoints: Vec<_> = (0..4)
            .map(|i| MockEndpoint::new(&format!("http://10.0.0.{i}:8545"), Reply::Down, &log))
            .collect();
        let provider = MultiProvider::new(pool_of(&endpoints));

        let err = provider.send(&block_request()).unwrap_err();
        assert_eq!(err.failures().len(), 4);
        assert!(endpoints.iter().all(|e| e.calls() == 1));
        // left on the last endpoint tried, not wrapped back to the start
        assert_eq!(provider.current_index(), 3);
    }

    #[test]
    fn exhaustion_is_not_sticky() {
        let log = log();
        let a = MockEndpoint::new("http://10.0.0.1:8545", Reply::Down, &log);
        let b = MockEndpoint::new("http://10.0.0.2:8545", Reply::Down, &log);
        let c = MockEndpoint::new("http://10.0.0.3:8545", Reply::Down, &log);
        let provider = MultiProvider::new(pool_of(&[a.clone(), b.clone(), c.clone()]));

        assert!(matches!(
            provider.send(&block_request()),
            Err(RouterError::NoActiveProvider { .. })
        ));
        assert_eq!(provider.current_index(), 2);

        c.set(ok("c"));
        log.lock().unwrap().clear();
        assert_eq!(provider.send(&block_request()).unwrap().result.unwrap(), "c");
        assert_eq!(*log.lock().unwrap(), vec!["http://10.0.0.3:8545"]);
        assert_eq!(provider.current_index(), 2);
    }

    #[test]
    fn recovery_resumes_from_cursor() {
        let log = log();
        let a = MockEndpoint::new("http://10.0.0.1:8545", Reply::Down, &log);
        let b = MockEndpoint::new("http://10.0.0.2:8545", Reply::Down, &log);
        let c = MockEndpoint::new("http://10.0.0.3:8545", Reply::Down, &log);
        let provider = MultiProvider::new(pool_of(&[a.clone(), b.clone(), c.clone()]));
        provider.send(&block_request()).unwrap_err();

        a.set(ok("a"));
        log.lock().unwrap().clear();
        assert_eq!(provider.send(&block_request()).unwrap().result.unwrap(), "a");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["http://10.0.0.3:8545", "http://10.0.0.1:8545"]
        );
        assert_eq!(provider.current_index(), 0);
        assert_eq!(a.calls(), 2);
    }

    #[test]
    fn application_error_does_not_advance() {
        let log = log();
        let a = MockEndpoint::new("http://10.0.0.1:8545", Reply::RpcError(-32000), &log);
        let b = MockEndpoint::new("http://10.0.0.2:8545", ok("b"), &log);
        let events = Arc::new(Events::default());
        let provider =
            MultiProvider::new(pool_of(&[a.clone(), b.clone()])).with_instrumentation(events.clone());

        match provider.send(&block_request()) {
            Err(RouterError::Application { error, .. }) => assert_eq!(error.code, -32000),
            other => panic!("expected application error, got {other:?}"),
        }
        assert_eq!(provider.current_index(), 0);
        assert_eq!(b.calls(), 0);
        assert!(events.switches.lock().unwrap().is_empty());
        assert_eq!(
            events.attempts.lock().unwrap()[0].1,
            AttemptOutcome::ApplicationError { code: -32000 }
        );
    }

    #[test]
    fn oversize_extra_data_is_a_validation_error() {
        let log = log();
        let header = serde_json::json!({ "extraData": format!("0x{}", "00".repeat(97)) });
        let a = MockEndpoint::new("http://10.0.0.1:8545", Reply::Ok(header), &log);
        let b = MockEndpoint::new("http://10.0.0.2:8545", ok("b"), &log);
        let provider = MultiProvider::new(pool_of(&[a, b.clone()]));

        assert!(matches!(
            provider.send(&block_request()),
            Err(RouterError::Validation { .. })
        ));
        assert_eq!(provider.current_index(), 0);
        assert_eq!(b.calls(), 0);
    }

    #[test]
    fn failure_messages_are_redacted() {
        let log = log();
        let a = MockEndpoint::new("https://eth-mainnet.alchemy.com/v2/secret", Reply::Down, &log);
        let provider = MultiProvider::new(pool_of(&[a]));
        let err = provider.send(&block_request()).unwrap_err();
        let msg = err.to_string();
        assert!(!msg.contains("secret"), "{msg}");
        assert!(msg.contains("alchemy.com"), "{msg}");
    }

    #[test]
    fn batch_follows_same_failover() {
        let log = log();
        let a = MockEndpoint::new("http://10.0.0.1:8545", Reply::Down, &log);
        let b = MockEndpoint::new("http://10.0.0.2:8545", ok("b"), &log);
        let provider = MultiProvider::new(pool_of(&[a, b]));

        let reqs = vec![block_request(), JsonRpcRequest::new(2, "eth_chainId", vec![])];
        let resps = provider.send_batch(&reqs).unwrap();
        assert_eq!(resps.len(), 2);
        assert_eq!(provider.current_index(), 1);
    }

    #[test]
    fn oversize_extra_data_in_reordered_batch_does_not_fail_over() {
        let a = ReversingEndpoint::new("http://10.0.0.1:8545", header_with_extra_data(97));
        let b = ReversingEndpoint::new("http://10.0.0.2:8545", header_with_extra_data(0));
        let provider = MultiProvider::new(pool_of(&[a, b]));

        assert!(matches!(
            provider.send_batch(&chain_and_block()),
            Err(RouterError::Validation { .. })
        ));
        assert_eq!(provider.current_index(), 0);
    }

    #[test]
    fn hook_sees_method_and_batch_size() {
        let log = log();
        let a = MockEndpoint::new("http://10.0.0.1:8545", Reply::Down, &log);
        let b = MockEndpoint::new("http://10.0.0.2:8545", ok("b"), &log);
        let events = Arc::new(Events::default());
        let provider = MultiProvider::new(pool_of(&[a, b])).with_instrumentation(events.clone());

        provider.send(&block_request()).unwrap();
        provider.send_batch(&chain_and_block()).unwrap();

        assert_eq!(
            *events.calls.lock().unwrap(),
            vec![
                ("eth_getBlockByNumber".to_string(), None),
                ("eth_getBlockByNumber".to_string(), None),
                ("batch".to_string(), Some(2)),
            ]
        );
    }

    #[test]
    fn switch_is_logged_once_with_tracing_hook() {
        let log = log();
        let a = MockEndpoint::new("http://10.0.0.1:8545", Reply::Down, &log);
        let b = MockEndpoint::new("http://10.0.0.2:8545", ok("b"), &log);
        let provider =
            MultiProvider::new(pool_of(&[a, b])).with_instrumentation(Arc::new(TracingInstrumentation));

        let (resp, lines) = capture_logs(|| provider.send(&block_request()));
        resp.unwrap();
        let switches = lines
            .iter()
            .filter(|l| l.message == "switched active provider")
            .count();
        assert_eq!(switches, 1);
    }

    #[test]
    fn answer_is_logged_against_the_endpoint_that_served_it() {
        let log = log();
        let a = MockEndpoint::new("http://10.0.0.1:8545", Reply::Down, &log);
        let b = MockEndpoint::new("http://10.0.0.2:8545", ok("b"), &log);
        let provider = MultiProvider::new(pool_of(&[a, b]));

        let (resp, lines) = capture_logs(|| provider.send(&block_request()));
        resp.unwrap();
        let answered: Vec<_> = lines.iter().filter(|l| l.message == "request answered").collect();
        assert_eq!(answered.len(), 1);
        assert_eq!(answered[0].endpoint.as_deref(), Some("10.0.0.2:8545"));
    }
}
