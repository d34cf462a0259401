//! Proof-of-Authority header post-processing.
//!
//! PoA chains (Gnosis, BSC, Polygon PoS, Goerli-era clique networks) pack
//! signer data into `extraData`, which then exceeds the 32 bytes Ethereum
//! allows. Responses to the block-fetching methods are checked after a
//! successful attempt and before they reach the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::request::JsonRpcResponse;

/// `extraData` bound on Ethereum mainnet, in bytes.
pub const MAX_EXTRA_DATA_BYTES: usize = 32;

const BLOCK_METHODS: &[&str] = &["eth_getBlockByHash", "eth_getBlockByNumber"];

/// What to do with block headers whose `extraData` is too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PoaPolicy {
    /// Reject the response with a validation error.
    Validate { max_extra_data_bytes: usize },
    /// Move the oversize value to `proofOfAuthorityData` and drop `extraData`.
    Sanitize { max_extra_data_bytes: usize },
    /// Pass headers through untouched.
    Disabled,
}

impl Default for PoaPolicy {
    fn default() -> Self {
        Self::Validate {
            max_extra_data_bytes: MAX_EXTRA_DATA_BYTES,
        }
    }
}

impl PoaPolicy {
    /// Check or rewrite `response` in place according to the policy.
    ///
    /// Only `eth_getBlockByHash` / `eth_getBlockByNumber` results that are
    /// objects with `extraData` and without `proofOfAuthorityData` are
    /// inspected.
    pub fn apply(&self, method: &str, response: &mut JsonRpcResponse) -> Result<(), ValidationError> {
        let max = match *self {
            Self::Disabled => return Ok(()),
            Self::Validate { max_extra_data_bytes } | Self::Sanitize { max_extra_data_bytes } => {
                max_extra_data_bytes
            }
        };
        if !BLOCK_METHODS.contains(&method) {
            return Ok(());
        }
        let Some(Value::Object(header)) = response.result.as_mut() else {
            return Ok(());
        };
        if header.contains_key("proofOfAuthorityData") {
            return Ok(());
        }
        let Some(extra) = header.get("extraData") else {
            return Ok(());
        };

        match (self, check_extra_data(extra, max)) {
            (_, Ok(())) => Ok(()),
            (Self::Sanitize { .. }, Err(ValidationError::ExtraDataTooLong { .. })) => {
                tracing::debug!(method, "PoA blockchain cleanup response");
                if let Some(extra) = header.remove("extraData") {
                    header.insert("proofOfAuthorityData".into(), extra);
                }
                Ok(())
            }
            (_, Err(e)) => Err(e),
        }
    }
}

fn check_extra_data(value: &Value, max: usize) -> Result<(), ValidationError> {
    let Some(raw) = value.as_str() else {
        return Err(ValidationError::ExtraDataNotHex(value.to_string()));
    };
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(digits).map_err(|e| ValidationError::ExtraDataNotHex(e.to_string()))?;
    if bytes.len() > max {
        return Err(ValidationError::ExtraDataTooLong {
            actual: bytes.len(),
            max,
        });
    }
    Ok(())
}
