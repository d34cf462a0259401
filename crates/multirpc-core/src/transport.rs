//! Transport capabilities consumed by the routers.
//!
//! A transport delivers one request to one endpoint. It returns `Ok` for any
//! well-formed JSON-RPC response, including ones that carry an error object,
//! and `Err` only when the endpoint could not be reached or did not speak
//! the protocol. Routers rely on that split to decide when to switch.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Non-blocking transport used by the async routers.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks.
///
/// # Cancellation
/// Dropping the returned future must abandon the in-flight I/O.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single request and wait for its response.
    async fn attempt(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Send a batch of requests.
    ///
    /// Default implementation sends them sequentially; override for true batching.
    async fn attempt_batch(
        &self,
        reqs: &[JsonRpcRequest],
    ) -> Result<Vec<JsonRpcResponse>, TransportError> {
        let mut responses = Vec::with_capacity(reqs.len());
        for req in reqs {
            responses.push(self.attempt(req).await?);
        }
        Ok(responses)
    }

    /// The endpoint URI this transport talks to.
    fn url(&self) -> &str;
}

/// Blocking transport used by [`MultiProvider`](crate::MultiProvider) and
/// [`FallbackProvider`](crate::FallbackProvider). Runs on the caller's thread.
pub trait BlockingTransport: Send + Sync + 'static {
    fn attempt(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    fn attempt_batch(
        &self,
        reqs: &[JsonRpcRequest],
    ) -> Result<Vec<JsonRpcResponse>, TransportError> {
        reqs.iter().map(|req| self.attempt(req)).collect()
    }

    fn url(&self) -> &str;
}
