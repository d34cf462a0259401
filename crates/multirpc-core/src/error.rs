//! Error taxonomy.
//!
//! [`TransportError`] is what a single attempt against one endpoint can fail
//! with. Routers absorb it to drive switching. [`RouterError`] is what a
//! caller of a router sees.

use thiserror::Error;

use crate::request::JsonRpcError;

/// A single attempt against one endpoint failed at the connectivity or
/// protocol level. Every variant makes a router move on to another endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, TLS failure, broken pipe.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The endpoint answered with a non-2xx status.
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The payload was not a JSON-RPC response.
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if retrying the same endpoint may help.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::WebSocket(_) | Self::Ipc(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) | Self::Other(_) => false,
        }
    }
}

/// Why one endpoint was rejected while serving a request.
#[derive(Debug)]
pub struct EndpointFailure {
    /// Display name of the endpoint, never the raw URI.
    pub endpoint: String,
    pub error: TransportError,
}

impl std::fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.endpoint, self.error)
    }
}

/// PoA header checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("extraData is {actual} bytes, chain allows at most {max}")]
    ExtraDataTooLong { actual: usize, max: usize },

    #[error("extraData is not valid hex: {0}")]
    ExtraDataNotHex(String),
}

/// Errors surfaced by routers.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The pool could not be built. Not retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Protocol \"{scheme}\" is not supported")]
    UnsupportedScheme { scheme: String },

    /// The node answered with a well-formed error object. Switching
    /// endpoints would not help, so it is handed back as is.
    #[error("{endpoint} returned {error}")]
    Application { endpoint: String, error: JsonRpcError },

    /// Every endpoint failed for this request.
    #[error("No active provider available ({})", join_failures(.failures))]
    NoActiveProvider { failures: Vec<EndpointFailure> },

    /// The response reached us but has the wrong shape for this chain.
    #[error("Invalid response from {endpoint}: {reason}")]
    Validation {
        endpoint: String,
        reason: ValidationError,
    },

    /// A typed call could not decode the node's result.
    #[error("Deserialization error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RouterError {
    /// `true` for errors raised while building a pool.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::UnsupportedScheme { .. })
    }

    /// Per-endpoint failures behind a `NoActiveProvider`, in attempt order.
    pub fn failures(&self) -> &[EndpointFailure] {
        match self {
            Self::NoActiveProvider { failures } => failures,
            _ => &[],
        }
    }
}

fn join_failures(failures: &[EndpointFailure]) -> String {
    if failures.is_empty() {
        return "no endpoints attempted".into();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
