//! Blocking HTTP JSON-RPC client backed by `reqwest::blocking`.
//!
//! Must not be constructed or used from inside a Tokio runtime thread;
//! `reqwest::blocking` runs its own runtime.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use multirpc_core::error::TransportError;
use multirpc_core::request::{align_batch, JsonRpcRequest, JsonRpcResponse};
use multirpc_core::transport::BlockingTransport;

use crate::client::{map_reqwest, HttpClientConfig};
use crate::retry::RetryPolicy;

pub struct BlockingHttpClient {
    url: String,
    http: reqwest::blocking::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl BlockingHttpClient {
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::blocking::Client::builder()
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

    fn post_once<B, R>(&self, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .map_err(|e| map_reqwest(e, self.request_timeout))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }

        let bytes = resp.bytes().map_err(|e| map_reqwest(e, self.request_timeout))?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    fn post<B, R>(&self, body: &B, retryable: bool) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut attempt = 0u32;
        loop {
            match self.post_once(body) {
                Err(e) if retryable && e.is_retryable() => {
                    attempt += 1;
                    let Some(delay) = self.retry.next_delay(attempt) else {
                        return Err(e);
                    };
                    tracing::debug!(attempt, error = %e, "retrying request on the same endpoint");
                    std::thread::sleep(delay);
                }
                other => return other,
            }
        }
    }
}

impl BlockingTransport for BlockingHttpClient {
    fn attempt(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        self.post(req, self.retry.covers(&req.method))
    }

    fn attempt_batch(&self, reqs: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>, TransportError> {
        if reqs.is_empty() {
            return Ok(vec![]);
        }
        let retryable = self.retry.covers_all(reqs.iter().map(|r| r.method.as_str()));
        let resps: Vec<JsonRpcResponse> = self.post(reqs, retryable)?;
        align_batch(reqs, resps)
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::serve;
    use crate::retry::RetryConfig;

    fn client(url: &str, max_retries: u32) -> BlockingHttpClient {
        BlockingHttpClient::new(
            url,
            HttpClientConfig {
                retry: RetryConfig {
                    max_retries,
                    initial_backoff: Duration::from_millis(1),
                    ..RetryConfig::default()
                },
                ..HttpClientConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn round_trip() {
        let server = serve(vec![(200, r#"{"jsonrpc":"2.0","id":3,"result":"0x5"}"#.into())]);
        let resp = client(&server.url, 0)
            .attempt(&JsonRpcRequest::new(3, "eth_blockNumber", vec![]))
            .unwrap();
        assert_eq!(resp.result, Some(serde_json::json!("0x5")));
    }

    #[test]
    fn rate_limited_read_is_retried() {
        let server = serve(vec![
            (429, "slow down".into()),
            (200, r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#.into()),
        ]);
        let resp = client(&server.url, 1)
            .attempt(&JsonRpcRequest::new(1, "eth_getBalance", vec![]))
            .unwrap();
        assert_eq!(resp.result, Some(serde_json::json!("0x1")));
    }

    #[test]
    fn retries_are_bounded() {
        let server = serve(vec![(500, "a".into()), (500, "b".into()), (500, "c".into())]);
        let err = client(&server.url, 1)
            .attempt(&JsonRpcRequest::new(1, "eth_call", vec![]))
            .unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 500, .. }));
        assert_eq!(server.bodies.lock().unwrap().len(), 2);
    }
}
