//! JSON-RPC 2.0 request and response envelopes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id for requests built by the routers' convenience calls.
pub fn next_request_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Request identifier. Nodes echo it back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
    Null,
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A positional JSON-RPC parameter.
pub type RpcParam = Value;

/// Outgoing call. Routers borrow it, so one request can be replayed
/// against several endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<RpcParam>,
    pub id: RpcId,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<RpcParam>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: RpcId::Number(id),
        }
    }

    /// Same call under a different id.
    pub fn with_id(&self, id: RpcId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }
}

/// Error object reported by a node. Receiving one means the endpoint is
/// reachable and speaking the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: RpcId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// `true` when the node answered with an error object.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Code of the error object, if any.
    pub fn error_code(&self) -> Option<i64> {
        self.error.as_ref().map(|e| e.code)
    }

    /// Split into the result value or the node's error object.
    /// A missing `result` on a non-error response reads as `null`.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Put batch responses back into request order by matching ids.
///
/// Nodes may answer a batch in any order. Each request id must appear
/// exactly once among the responses; anything else is
/// [`TransportError::Malformed`].
pub fn align_batch(
    reqs: &[JsonRpcRequest],
    resps: Vec<JsonRpcResponse>,
) -> Result<Vec<JsonRpcResponse>, TransportError> {
    if resps.len() != reqs.len() {
        return Err(TransportError::Malformed(format!(
            "batch of {} requests answered with {} responses",
            reqs.len(),
            resps.len()
        )));
    }

    let mut by_id = HashMap::with_capacity(resps.len());
    for resp in resps {
        let id = resp.id.clone();
        if by_id.insert(id.clone(), resp).is_some() {
            return Err(TransportError::Malformed(format!("batch response id {id} repeated")));
        }
    }

    reqs.iter()
        .map(|req| {
            by_id
                .remove(&req.id)
                .ok_or_else(|| TransportError::Malformed(format!("no batch response for id {}", req.id)))
        })
        .collect()
}
