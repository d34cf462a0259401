//! Async HTTP JSON-RPC client backed by `reqwest`.
//!
//! Features:
//! - Per-request timeout
//! - Exception retry with exponential backoff for idempotent methods
//! - True HTTP batching (one POST with a JSON array)

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use multirpc_core::error::TransportError;
use multirpc_core::request::{align_batch, JsonRpcRequest, JsonRpcResponse};
use multirpc_core::transport::RpcTransport;

use crate::retry::{RetryConfig, RetryPolicy};

/// Configuration shared by [`HttpRpcClient`] and
/// [`BlockingHttpClient`](crate::BlockingHttpClient).
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("multirpc/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP JSON-RPC client for one endpoint.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl HttpRpcClient {
    /// Create a client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            request_timeout: config.request_timeout,
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, HttpClientConfig::default())
    }

    async fn post_once<B, R>(&self, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let resp = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.request_timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| map_reqwest(e, self.request_timeout))?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    async fn post<B, R>(&self, body: &B, retryable: bool) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let mut attempt = 0u32;
        loop {
            match self.post_once(body).await {
                Ok(resp) => return Ok(resp),
                Err(e) if retryable && e.is_retryable() => {
                    attempt += 1;
                    let Some(delay) = self.retry.next_delay(attempt) else {
                        return Err(e);
                    };
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying request on the same endpoint"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub(crate) fn map_reqwest(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            ms: timeout.as_millis() as u64,
        }
    } else if e.is_decode() {
        TransportError::Malformed(e.to_string())
    } else {
        TransportError::Http(e.to_string())
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn attempt(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        self.post(req, self.retry.covers(&req.method)).await
    }

    async fn attempt_batch(&self, reqs: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>, TransportError> {
        if reqs.is_empty() {
            return Ok(vec![]);
        }
        let retryable = self.retry.covers_all(reqs.iter().map(|r| r.method.as_str()));
        let resps: Vec<JsonRpcResponse> = self.post(reqs, retryable).await?;
        align_batch(reqs, resps)
    }

    fn url(&self) -> &str {
        &self.url
    }
}
