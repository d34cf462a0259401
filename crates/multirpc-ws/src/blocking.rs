//! Blocking WebSocket JSON-RPC client on top of `tungstenite`.

use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio_tungstenite::tungstenite::stream::MaybeTlsStream;
use tokio_tungstenite::tungstenite::{self, Message, WebSocket};
use url::Url;

use multirpc_core::error::TransportError;
use multirpc_core::request::{JsonRpcRequest, JsonRpcResponse};
use multirpc_core::transport::BlockingTransport;

use crate::client::WsClientConfig;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// One lazily opened connection, used by one request at a time. Any I/O
/// error drops the connection and the next attempt dials again.
pub struct BlockingWsClient {
    url: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    socket: Mutex<Option<Socket>>,
}

impl BlockingWsClient {
    pub fn new(url: impl Into<String>, config: &WsClientConfig) -> Self {
        Self {
            url: url.into(),
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            socket: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Socket>> {
        self.socket.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dial(&self) -> Result<Socket, TransportError> {
        let parsed = Url::parse(&self.url).map_err(|e| TransportError::WebSocket(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| TransportError::WebSocket("missing host".into()))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| TransportError::WebSocket("missing port".into()))?;
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| TransportError::WebSocket(e.to_string()))?
            .next()
            .ok_or_else(|| TransportError::WebSocket(format!("{host} did not resolve")))?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| self.io_error(e))?;
        stream
            .set_read_timeout(Some(self.request_timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.request_timeout)))
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;

        let (socket, _) = tungstenite::client_tls_with_config(self.url.as_str(), stream, None, None)
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        tracing::debug!("blocking WebSocket connected");
        Ok(socket)
    }

    fn io_error(&self, e: std::io::Error) -> TransportError {
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            },
            _ => TransportError::WebSocket(e.to_string()),
        }
    }

    fn ws_error(&self, e: tungstenite::Error) -> TransportError {
        match e {
            tungstenite::Error::Io(io) => self.io_error(io),
            other => TransportError::WebSocket(other.to_string()),
        }
    }

    fn exchange(&self, socket: &mut Socket, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let text = serde_json::to_string(req).map_err(|e| TransportError::Other(e.to_string()))?;
        socket.send(Message::Text(text)).map_err(|e| self.ws_error(e))?;

        loop {
            let text = match socket.read().map_err(|e| self.ws_error(e))? {
                Message::Text(text) => text,
                Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Message::Close(_) => return Err(TransportError::WebSocket("connection closed".into())),
                _ => continue,
            };
            let resp: JsonRpcResponse =
                serde_json::from_str(&text).map_err(|e| TransportError::Malformed(e.to_string()))?;
            if resp.id == req.id {
                return Ok(resp);
            }
            tracing::debug!(id = %resp.id, "skipping response for another request");
        }
    }
}

impl BlockingTransport for BlockingWsClient {
    fn attempt(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(self.dial()?);
        }
        let Some(socket) = slot.as_mut() else {
            return Err(TransportError::WebSocket("not connected".into()));
        };
        let result = self.exchange(socket, req);
        if result.is_err() {
            *slot = None;
        }
        result
    }

    fn url(&self) -> &str {
        &self.url
    }
}
