//! multirpc-providers — turn endpoint URIs into routers.
//!
//! The scheme of each URI picks the transport:
//!
//! | scheme          | async                 | blocking              |
//! |-----------------|-----------------------|-----------------------|
//! | `http`, `https` | [`HttpRpcClient`]     | [`BlockingHttpClient`] |
//! | `ws`, `wss`     | [`WsRpcClient`]       | [`BlockingWsClient`]  |
//! | `ipc`           | `IpcRpcClient`        | `BlockingIpcClient`   |
//!
//! # Quick start
//! ```rust,no_run
//! use multirpc_core::Router;
//! use multirpc_providers::{connect, TransportOptions};
//!
//! # async fn demo() -> Result<(), multirpc_core::RouterError> {
//! let pool = connect(
//!     ["https://eth-mainnet.g.alchemy.com/v2/KEY", "https://rpc.ankr.com/eth"],
//!     &TransportOptions::default(),
//! )
//! .await?;
//! let router = multirpc_core::AsyncMultiProvider::new(pool);
//! let head: String = router.call("eth_blockNumber", vec![]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`HttpRpcClient`]: multirpc_http::HttpRpcClient
//! [`BlockingHttpClient`]: multirpc_http::BlockingHttpClient
//! [`WsRpcClient`]: multirpc_ws::WsRpcClient
//! [`BlockingWsClient`]: multirpc_ws::BlockingWsClient

pub mod config;
pub mod transports;

pub use config::ProviderConfig;
pub use transports::{connect, connect_blocking, TransportOptions};
