//! multirpc-core — routing JSON-RPC requests across redundant endpoints.
//!
//! # Overview
//!
//! A router holds an ordered [`EndpointPool`] and decides which endpoint
//! each request goes to:
//!
//! - [`MultiProvider`] / [`AsyncMultiProvider`] — failover: stick with the
//!   current endpoint until it fails, then advance a shared cursor
//! - [`FallbackProvider`] / [`AsyncFallbackProvider`] — broadcast: try every
//!   endpoint in order for each request
//!
//! The crate also defines:
//!
//! - [`RpcTransport`] / [`BlockingTransport`] — what an endpoint connection implements
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`] — wire types
//! - [`RouterError`] / [`TransportError`] — structured error types
//! - [`Instrumentation`] — per-attempt and per-switch hook
//! - [`PoaPolicy`] — post-processing of proof-of-authority block headers

pub mod endpoint;
pub mod error;
pub mod instrument;
pub mod poa;
pub mod pool;
pub mod request;
pub mod router;
pub mod transport;

pub use endpoint::{display_name, normalize_provider, redact, Scheme};
pub use error::{EndpointFailure, RouterError, TransportError, ValidationError};
pub use instrument::{Attempt, AttemptOutcome, Instrumentation, TracingInstrumentation};
pub use poa::{PoaPolicy, MAX_EXTRA_DATA_BYTES};
pub use pool::{EndpointDescriptor, EndpointPool};
pub use request::{align_batch, next_request_id, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId, RpcParam};
pub use router::{
    AsyncFallbackProvider, AsyncMultiProvider, BlockingRouter, FallbackProvider, MultiProvider, Router,
    Strategy,
};
pub use transport::{BlockingTransport, RpcTransport};
