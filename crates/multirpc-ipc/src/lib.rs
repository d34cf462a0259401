//! multirpc-ipc — JSON-RPC over a local Unix domain socket, as exposed by
//! geth (`ipc:///path/to/geth.ipc`).
//!
//! Each attempt opens its own connection, writes one request and reads until
//! a complete JSON value has arrived.

#[cfg(unix)]
pub mod blocking;
#[cfg(unix)]
pub mod client;

#[cfg(unix)]
pub use blocking::BlockingIpcClient;
#[cfg(unix)]
pub use client::IpcRpcClient;

use std::time::Duration;

use serde::de::DeserializeOwned;

use multirpc_core::error::TransportError;

/// Configuration for the IPC clients.
#[derive(Debug, Clone)]
pub struct IpcClientConfig {
    pub request_timeout: Duration,
    /// Upper bound on a single response.
    pub max_response_bytes: usize,
}

impl Default for IpcClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_response_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Socket path of an `ipc://` URI.
pub fn socket_path(uri: &str) -> &str {
    uri.strip_prefix("ipc://").unwrap_or(uri)
}

/// Finds the end of the first top-level JSON object or array in a growing
/// buffer. Each byte is scanned once across calls, so a response arriving in
/// many small reads is parsed only after it is complete.
#[derive(Debug, Default)]
pub(crate) struct Framer {
    scanned: usize,
    depth: usize,
    started: bool,
    in_string: bool,
    escaped: bool,
}

impl Framer {
    /// Scan the bytes appended to `buf` since the previous call. Returns the
    /// length of the value once its closing bracket has arrived.
    pub(crate) fn feed(&mut self, buf: &[u8]) -> Result<Option<usize>, TransportError> {
        while let Some(&byte) = buf.get(self.scanned) {
            self.scanned += 1;
            if self.in_string {
                match byte {
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }
            match byte {
                b'"' if self.started => self.in_string = true,
                b'{' | b'[' => {
                    self.started = true;
                    self.depth += 1;
                }
                b'}' | b']' if self.started => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Ok(Some(self.scanned));
                    }
                }
                b' ' | b'\t' | b'\r' | b'\n' => {}
                _ if !self.started => {
                    return Err(TransportError::Malformed(format!(
                        "expected a JSON object or array, got byte 0x{byte:02x}"
                    )))
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

/// Decode a complete value found by [`Framer`].
pub(crate) fn decode<T: DeserializeOwned>(value: &[u8]) -> Result<T, TransportError> {
    serde_json::from_slice(value).map_err(|e| TransportError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn strips_scheme() {
        assert_eq!(socket_path("ipc:///tmp/geth.ipc"), "/tmp/geth.ipc");
        assert_eq!(socket_path("/tmp/geth.ipc"), "/tmp/geth.ipc");
    }

    #[test]
    fn waits_for_the_closing_bracket() {
        let reply = br#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#;
        let mut framer = Framer::default();
        assert_eq!(framer.feed(b"").unwrap(), None);
        assert_eq!(framer.feed(&reply[..20]).unwrap(), None);
        assert_eq!(framer.feed(reply).unwrap(), Some(reply.len()));
        let value: Value = decode(reply).unwrap();
        assert_eq!(value["result"], "0x1");
    }

    #[test]
    fn brackets_inside_strings_are_ignored() {
        let reply = br#"  {"id":1,"result":{"data":"}]\"{["},"x":[1,[2]]} trailing"#;
        let mut framer = Framer::default();
        let end = framer.feed(reply).unwrap().unwrap();
        assert_eq!(&reply[end..], b" trailing");
        let value: Value = decode(&reply[..end]).unwrap();
        assert_eq!(value["result"]["data"], "}]\"{[");
    }

    #[test]
    fn non_container_reply_is_malformed() {
        assert!(matches!(
            Framer::default().feed(b"}garbage"),
            Err(TransportError::Malformed(_))
        ));
        assert!(matches!(
            Framer::default().feed(b"\"0x1\""),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn large_reply_in_small_reads_is_found_once() {
        let logs: Vec<Value> = (0..20_000)
            .map(|i| serde_json::json!({ "logIndex": format!("0x{i:x}"), "data": "0x".to_string() + &"ab".repeat(64) }))
            .collect();
        let reply = serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": logs }).to_string();

        let mut framer = Framer::default();
        let mut buf = Vec::new();
        let mut found = None;
        for chunk in reply.as_bytes().chunks(4096) {
            assert!(found.is_none());
            buf.extend_from_slice(chunk);
            found = framer.feed(&buf).unwrap();
        }
        assert_eq!(found, Some(reply.len()));
        let value: Value = decode(&buf).unwrap();
        assert_eq!(value["result"].as_array().unwrap().len(), 20_000);
    }
}
