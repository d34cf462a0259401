//! Blocking IPC client on `std::os::unix::net::UnixStream`.

use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use multirpc_core::error::TransportError;
use multirpc_core::request::{JsonRpcRequest, JsonRpcResponse};
use multirpc_core::transport::BlockingTransport;

use crate::{decode, socket_path, Framer, IpcClientConfig};

pub struct BlockingIpcClient {
    url: String,
    request_timeout: Duration,
    max_response_bytes: usize,
}

impl BlockingIpcClient {
    pub fn new(url: impl Into<String>, config: &IpcClientConfig) -> Self {
        Self {
            url: url.into(),
            request_timeout: config.request_timeout,
            max_response_bytes: config.max_response_bytes,
        }
    }

    fn timeout(&self) -> TransportError {
        TransportError::Timeout {
            ms: self.request_timeout.as_millis() as u64,
        }
    }

    fn io(&self, e: std::io::Error) -> TransportError {
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => self.timeout(),
            _ => TransportError::Ipc(e.to_string()),
        }
    }

    fn exchange<B, R>(&self, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let deadline = Instant::now() + self.request_timeout;
        let payload = serde_json::to_vec(body).map_err(|e| TransportError::Other(e.to_string()))?;

        let path = socket_path(&self.url);
        let mut stream = UnixStream::connect(path).map_err(|e| {
            tracing::debug!(path, error = %e, "IPC connect failed");
            self.io(e)
        })?;
        stream
            .set_write_timeout(Some(self.request_timeout))
            .map_err(|e| self.io(e))?;
        stream.write_all(&payload).map_err(|e| self.io(e))?;

        let mut framer = Framer::default();
        let mut buf = Vec::with_capacity(4096);
        let mut chunk = [0u8; 4096];
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(self.timeout());
            }
            stream.set_read_timeout(Some(left)).map_err(|e| self.io(e))?;
            let n = stream.read(&mut chunk).map_err(|e| self.io(e))?;
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
}

impl BlockingTransport for BlockingIpcClient {
    fn attempt(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        self.exchange(req)
    }

    fn attempt_batch(&self, reqs: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>, TransportError> {
        if reqs.is_empty() {
            return Ok(vec![]);
        }
        self.exchange(reqs)
    }

    fn url(&self) -> &str {
        &self.url
    }
}
