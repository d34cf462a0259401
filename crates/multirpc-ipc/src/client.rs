//! Async IPC client on `tokio::net::UnixStream`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use multirpc_core::error::TransportError;
use multirpc_core::request::{JsonRpcRequest, JsonRpcResponse};
use multirpc_core::transport::RpcTransport;

use crate::{decode, socket_path, Framer, IpcClientConfig};

pub struct IpcRpcClient {
    url: String,
    request_timeout: Duration,
    max_response_bytes: usize,
}

impl IpcRpcClient {
    pub fn new(url: impl Into<String>, config: &IpcClientConfig) -> Self {
        Self {
            url: url.into(),
            request_timeout: config.request_timeout,
            max_response_bytes: config.max_response_bytes,
        }
    }

    async fn exchange<B, R>(&self, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|e| TransportError::Other(e.to_string()))?;
        let path = socket_path(&self.url);
        let mut stream = UnixStream::connect(path).await.map_err(|e| {
            tracing::debug!(path, error = %e, "IPC connect failed");
            TransportError::Ipc(e.to_string())
        })?;
        stream
            .write_all(&payload)
            .await
            .map_err(|e| TransportError::Ipc(e.to_string()))?;

        let mut framer = Framer::default();
        let mut buf = Vec::with_capacity(4096);
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| TransportError::Ipc(e.to_string()))?;
            if n == 0 {
                tracing::debug!(read = buf.len(), "IPC socket closed mid-response");
                return Err(TransportError::Ipc("socket closed before a full response".into()));
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = framer.feed(&buf)? {
                return decode(&buf[..end]);
            }
            if buf.len() > self.max_response_bytes {
                tracing::warn!(read = buf.len(), "IPC response over size limit, dropping connection");
                return Err(TransportError::Malformed(format!(
                    "response exceeds {} bytes",
                    self.max_response_bytes
                )));
            }
        }
    }

    async fn timed<B, R>(&self, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        tokio::time::timeout(self.request_timeout, self.exchange(body))
            .await
            .map_err(|_| TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            })?
    }
}

#[async_trait]
impl RpcTransport for IpcRpcClient {
    async fn attempt(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        self.timed(req).await
    }

    async fn attempt_batch(&self, reqs: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>, TransportError> {
        if reqs.is_empty() {
            return Ok(vec![]);
        }
        self.timed(reqs).await
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::{json, Value};
    use tokio::net::UnixListener;

    use super::*;

    fn socket(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("multirpc-{}-{name}.ipc", std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    /// Reply to one request in two separate writes.
    async fn split_reply_server(path: &PathBuf) {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            let req: Value = serde_json::from_slice(&buf[..n]).unwrap();
            let reply = json!({ "jsonrpc": "2.0", "id": req["id"], "result": "0x2a" }).to_string();
            let (head, tail) = reply.split_at(reply.len() / 2);
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            stream.write_all(tail.as_bytes()).await.unwrap();
        });
    }

    #[tokio::test]
    async fn reads_until_the_value_is_complete() {
        let path = socket("split");
        split_reply_server(&path).await;
        let uri = format!("ipc://{}", path.display());
        let client = IpcRpcClient::new(uri, &IpcClientConfig::default());

        let resp = client
            .attempt(&JsonRpcRequest::new(9, "eth_chainId", vec![]))
            .await
            .unwrap();
        assert_eq!(resp.result, Some(json!("0x2a")));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_socket_is_an_ipc_error() {
        let path = socket("missing");
        let client = IpcRpcClient::new(format!("ipc://{}", path.display()), &IpcClientConfig::default());
        let err = client
            .attempt(&JsonRpcRequest::new(1, "eth_chainId", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Ipc(_)), "{err:?}");
    }

    #[tokio::test]
    async fn silent_node_times_out() {
        let path = socket("silent");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });
        let client = IpcRpcClient::new(
            format!("ipc://{}", path.display()),
            &IpcClientConfig {
                request_timeout: Duration::from_millis(50),
                ..IpcClientConfig::default()
            },
        );
        let err = client
            .attempt(&JsonRpcRequest::new(1, "eth_chainId", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { ms: 50 }), "{err:?}");
        let _ = std::fs::remove_file(&path);
    }
}
