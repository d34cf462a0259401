//! multirpc-ws — WebSocket JSON-RPC transport.
//!
//! # Features
//! - Auto-reconnect on disconnect (exponential backoff)
//! - Request multiplexing over a single connection
//! - Fail-fast while the connection is down, so routers move on
//! - A blocking client for the blocking routers

pub mod blocking;
pub mod client;

pub use blocking::BlockingWsClient;
pub use client::{WsClientConfig, WsRpcClient};
