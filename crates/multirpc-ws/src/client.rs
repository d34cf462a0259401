//! WebSocket JSON-RPC client with auto-reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

use multirpc_core::error::TransportError;
use multirpc_core::request::{JsonRpcRequest, JsonRpcResponse, RpcId};
use multirpc_core::transport::RpcTransport;

type Reply = oneshot::Sender<Result<JsonRpcResponse, TransportError>>;

/// In-flight requests keyed by the id sent on the wire. Keeps the caller's
/// own id so it can be put back on the response.
#[derive(Clone, Default)]
struct Pending(Arc<Mutex<HashMap<u64, (RpcId, Reply)>>>);

impl Pending {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, (RpcId, Reply)>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fail_all(&self, reason: &str) {
        for (_, (_, tx)) in self.lock().drain() {
            let _ = tx.send(Err(TransportError::WebSocket(reason.to_string())));
        }
    }
}

/// Configuration for the WebSocket client.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// Reconnect backoff starting duration.
    pub reconnect_initial: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_max: Duration,
    /// How long [`WsRpcClient::connect`] waits for the first connection.
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Command sent from callers to the background WS task.
enum WsCommand {
    Send { wire_id: u64, text: String },
    Close,
}

/// WebSocket JSON-RPC client.
///
/// A background task owns the connection and reconnects with exponential
/// backoff. While it is down every request fails immediately with
/// [`TransportError::WebSocket`], which lets a router switch endpoints
/// instead of queueing behind a dead socket.
pub struct WsRpcClient {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    connected: watch::Receiver<bool>,
    pending: Pending,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl WsRpcClient {
    /// Start the background task for `url` and wait up to
    /// `connect_timeout` for the first connection. An endpoint that is down
    /// still yields a client; it just fails fast until it comes up.
    pub async fn connect(url: impl Into<String>, config: WsClientConfig) -> Self {
        let url = url.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<WsCommand>();
        let (state_tx, mut connected) = watch::channel(false);
        let pending = Pending::default();
        let request_timeout = config.request_timeout;
        let connect_timeout = config.connect_timeout;

        tokio::spawn(ws_task(url.clone(), cmd_rx, state_tx, pending.clone(), config));

        if time::timeout(connect_timeout, connected.wait_for(|up| *up))
            .await
            .is_err()
        {
            tracing::debug!("WebSocket endpoint not up yet, continuing in background");
        }

        Self {
            url,
            cmd_tx,
            connected,
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }
}

impl Drop for WsRpcClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

/// Removes the pending entry if the request future is dropped early.
struct Forget<'a> {
    pending: &'a Pending,
    wire_id: u64,
}

impl Drop for Forget<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.wire_id);
    }
}

#[async_trait]
impl RpcTransport for WsRpcClient {
    async fn attempt(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::WebSocket("not connected".into()));
        }

        let wire_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&req.with_id(RpcId::Number(wire_id)))
            .map_err(|e| TransportError::Other(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(wire_id, (req.id.clone(), tx));
        let _forget = Forget {
            pending: &self.pending,
            wire_id,
        };

        self.cmd_tx
            .send(WsCommand::Send { wire_id, text })
            .map_err(|_| TransportError::WebSocket("WS task closed".into()))?;

        match time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::WebSocket("WS response dropped".into())),
            Err(_) => Err(TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Background task that owns the WebSocket connection.
async fn ws_task(
    url: String,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    state: watch::Sender<bool>,
    pending: Pending,
    config: WsClientConfig,
) {
    let mut backoff = config.reconnect_initial;

    loop {
        tracing::debug!("connecting via WebSocket");

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Err(e) => {
                tracing::warn!(error = %e, "WS connect failed, retrying in {backoff:?}");
            }
            Ok((ws_stream, _)) => {
                backoff = config.reconnect_initial;
                let _ = state.send(true);
                let (mut sink, mut stream) = ws_stream.split();

                loop {
                    tokio::select! {
                        cmd = cmd_rx.recv() => {
                            match cmd {
                                None | Some(WsCommand::Close) => {
                                    let _ = sink.close().await;
                                    pending.fail_all("client closed");
                                    return;
                                }
                                Some(WsCommand::Send { wire_id, text }) => {
                                    if let Err(e) = sink.send(Message::Text(text)).await {
                                        if let Some((_, tx)) = pending.lock().remove(&wire_id) {
                                            let _ = tx.send(Err(TransportError::WebSocket(e.to_string())));
                                        }
                                        break;
                                    }
                                }
                            }
                        }
                        msg = stream.next() => {
                            match msg {
                                None => break,
                                Some(Err(e)) => {
                                    tracing::warn!(error = %e, "WS receive error");
                                    break;
                                }
                                Some(Ok(Message::Text(text))) => handle_message(&text, &pending),
                                Some(Ok(Message::Binary(bytes))) => {
                                    handle_message(&String::from_utf8_lossy(&bytes), &pending)
                                }
                                Some(Ok(Message::Close(_))) => break,
                                _ => {}
                            }
                        }
                    }
                }

                let _ = state.send(false);
                pending.fail_all("connection closed");
                tracing::warn!("WS disconnected, reconnecting in {backoff:?}");
            }
        }

        // keep draining commands while waiting so callers are never stuck
        let sleep = time::sleep(backoff);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(WsCommand::Close) => {
                        pending.fail_all("client closed");
                        return;
                    }
                    Some(WsCommand::Send { wire_id, .. }) => {
                        if let Some((_, tx)) = pending.lock().remove(&wire_id) {
                            let _ = tx.send(Err(TransportError::WebSocket("not connected".into())));
                        }
                    }
                },
            }
        }
        backoff = (backoff * 2).min(config.reconnect_max);
    }
}

fn handle_message(text: &str, pending: &Pending) {
    let Ok(mut resp) = serde_json::from_str::<JsonRpcResponse>(text) else {
        tracing::debug!("ignoring WS message that is not a JSON-RPC response");
        return;
    };
    let RpcId::Number(wire_id) = resp.id else {
        return;
    };
    if let Some((caller_id, tx)) = pending.lock().remove(&wire_id) {
        resp.id = caller_id;
        let _ = tx.send(Ok(resp));
    }
}
