//! Endpoint URIs: scheme detection, provider naming and log redaction.
//!
//! Endpoint URIs frequently embed API keys (`.../v2/<key>`), so nothing
//! outside this module should print a raw URI. Logs, metrics labels and
//! [`EndpointFailure`](crate::EndpointFailure) use [`display_name`].

use url::Url;

use crate::error::RouterError;

/// Transport family selected by an endpoint URI's scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    Ws,
    Wss,
    /// Local socket, `ipc:///path/to/geth.ipc`.
    Ipc,
}

impl Scheme {
    /// Parse the scheme of `uri`.
    ///
    /// Anything other than `http`, `https`, `ws`, `wss` or `ipc` is a
    /// configuration error.
    pub fn parse(uri: &str) -> Result<Self, RouterError> {
        let Some((scheme, rest)) = uri.split_once("://") else {
            return Err(RouterError::Configuration(format!(
                "endpoint has no scheme: {}",
                display_name(uri)
            )));
        };
        let parsed = match scheme.to_ascii_lowercase().as_str() {
            "http" => Self::Http,
            "https" => Self::Https,
            "ws" => Self::Ws,
            "wss" => Self::Wss,
            "ipc" => Self::Ipc,
            other => {
                return Err(RouterError::UnsupportedScheme {
                    scheme: other.to_string(),
                })
            }
        };
        if rest.is_empty() {
            return Err(RouterError::Configuration(format!(
                "endpoint has an empty {scheme}:// address"
            )));
        }
        Ok(parsed)
    }

    pub fn is_http(self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }

    pub fn is_websocket(self) -> bool {
        matches!(self, Self::Ws | Self::Wss)
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
            Self::Ws => write!(f, "ws"),
            Self::Wss => write!(f, "wss"),
            Self::Ipc => write!(f, "ipc"),
        }
    }
}

/// Short provider name for an HTTP(S) endpoint.
///
/// IPv4 hosts (with optional port) are kept whole. DNS hosts collapse to
/// their two highest labels, so `https://eth-mainnet.alchemy.com/v2/key`
/// becomes `alchemy.com`. Single-label hosts such as `localhost` are
/// rejected.
pub fn normalize_provider(uri: &str) -> Result<String, RouterError> {
    let lowered = uri.to_ascii_lowercase();
    let stripped = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let host = stripped.split('/').next().unwrap_or_default();

    if is_ipv4_with_port(host) {
        return Ok(host.to_string());
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        return Ok(labels[labels.len() - 2..].join("."));
    }

    Err(RouterError::Configuration(format!(
        "Unhandled hostname format: {host}. Hostname must be either an IP address or a valid provider address."
    )))
}

fn is_ipv4_with_port(host: &str) -> bool {
    let (addr, port) = match host.split_once(':') {
        Some((addr, port)) => (addr, Some(port)),
        None => (host, None),
    };
    if let Some(port) = port {
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }
    let octets: Vec<&str> = addr.split('.').collect();
    octets.len() == 4
        && octets
            .iter()
            .all(|o| (1..=3).contains(&o.len()) && o.chars().all(|c| c.is_ascii_digit()))
}

/// Name used for an endpoint in logs, metrics and errors.
///
/// HTTP(S) endpoints use [`normalize_provider`]. Socket paths are shown as
/// is. Other schemes, and hosts the normaliser rejects, fall back to
/// `scheme://host[:port]` with path, query and credentials dropped.
pub fn display_name(uri: &str) -> String {
    if let Ok(name) = normalize_provider(uri) {
        if uri.starts_with("http") || !uri.contains("://") {
            return name;
        }
    }
    if uri.starts_with("ipc://") {
        return uri.to_string();
    }
    match Url::parse(uri) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}://{host}:{port}", url.scheme()),
            (Some(host), None) => format!("{}://{host}", url.scheme()),
            (None, _) => format!("{}://", url.scheme()),
        },
        Err(_) => "****".to_string(),
    }
}

/// Replace every occurrence of `uri` in `message` with `****`.
pub fn redact(message: &str, uri: &str) -> String {
    if uri.is_empty() {
        return message.to_string();
    }
    message.replace(uri, "****")
}
