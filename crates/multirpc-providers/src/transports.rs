//! Scheme → transport mapping.

use std::sync::Arc;

use multirpc_core::{
    display_name, BlockingTransport, EndpointDescriptor, EndpointPool, RouterError, RpcTransport, Scheme,
};
use multirpc_http::{BlockingHttpClient, HttpClientConfig, HttpRpcClient};
use multirpc_ipc::IpcClientConfig;
use multirpc_ws::{BlockingWsClient, WsClientConfig, WsRpcClient};

/// Per-transport settings used when building a pool.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    pub http: HttpClientConfig,
    pub ws: WsClientConfig,
    pub ipc: IpcClientConfig,
}

/// Build an async pool. Every URI is validated before any connection is
/// opened, so a bad scheme anywhere in the list fails fast.
pub async fn connect<I, S>(uris: I, options: &TransportOptions) -> Result<EndpointPool<dyn RpcTransport>, RouterError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parsed = uris
        .into_iter()
        .map(|uri| {
            let uri = uri.as_ref().to_string();
            Scheme::parse(&uri).map(|scheme| (uri, scheme))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut endpoints = Vec::with_capacity(parsed.len());
    for (uri, scheme) in parsed {
        let transport: Arc<dyn RpcTransport> = match scheme {
            Scheme::Http | Scheme::Https => Arc::new(
                HttpRpcClient::new(uri.as_str(), options.http.clone()).map_err(configuration(&uri))?,
            ),
            Scheme::Ws | Scheme::Wss => Arc::new(WsRpcClient::connect(uri.as_str(), options.ws.clone()).await),
            Scheme::Ipc => ipc_async(&uri, &options.ipc)?,
        };
        tracing::debug!(endpoint = %display_name(&uri), %scheme, "endpoint added to pool");
        endpoints.push(EndpointDescriptor::new(uri, transport));
    }
    EndpointPool::new(endpoints)
}

/// Build a blocking pool. Must not be called from inside an async runtime.
pub fn connect_blocking<I, S>(
    uris: I,
    options: &TransportOptions,
) -> Result<EndpointPool<dyn BlockingTransport>, RouterError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let uris: Vec<String> = uris.into_iter().map(|u| u.as_ref().to_string()).collect();
    for uri in &uris {
        Scheme::parse(uri)?;
    }
    EndpointPool::from_uris(&uris, |uri, scheme| {
        let transport: Arc<dyn BlockingTransport> = match scheme {
            Scheme::Http | Scheme::Https => Arc::new(
                BlockingHttpClient::new(uri, options.http.clone()).map_err(configuration(uri))?,
            ),
            Scheme::Ws | Scheme::Wss => Arc::new(BlockingWsClient::new(uri, &options.ws)),
            Scheme::Ipc => ipc_blocking(uri, &options.ipc)?,
        };
        Ok(transport)
    })
}

fn configuration(uri: &str) -> impl FnOnce(multirpc_core::TransportError) -> RouterError + '_ {
    move |e| RouterError::Configuration(format!("{}: {e}", display_name(uri)))
}

#[cfg(unix)]
fn ipc_async(uri: &str, config: &IpcClientConfig) -> Result<Arc<dyn RpcTransport>, RouterError> {
    Ok(Arc::new(multirpc_ipc::IpcRpcClient::new(uri, config)))
}

#[cfg(unix)]
fn ipc_blocking(uri: &str, config: &IpcClientConfig) -> Result<Arc<dyn BlockingTransport>, RouterError> {
    Ok(Arc::new(multirpc_ipc::BlockingIpcClient::new(uri, config)))
}

#[cfg(not(unix))]
fn ipc_async(_uri: &str, _config: &IpcClientConfig) -> Result<Arc<dyn RpcTransport>, RouterError> {
    Err(RouterError::Configuration("ipc endpoints need a unix platform".into()))
}

#[cfg(not(unix))]
fn ipc_blocking(_uri: &str, _config: &IpcClientConfig) -> Result<Arc<dyn BlockingTransport>, RouterError> {
    Err(RouterError::Configuration("ipc endpoints need a unix platform".into()))
}
