//! multirpc-http — HTTP(S) JSON-RPC transport.
//!
//! - [`HttpRpcClient`] for the async routers, backed by `reqwest`
//! - [`BlockingHttpClient`] for the blocking routers, backed by `reqwest::blocking`
//! - [`RetryPolicy`] retries transient failures of idempotent methods
//!   against the same endpoint before the router gives up on it

pub mod blocking;
pub mod client;
pub mod retry;

pub use blocking::BlockingHttpClient;
pub use client::{HttpClientConfig, HttpRpcClient};
pub use retry::{RetryConfig, RetryPolicy};
