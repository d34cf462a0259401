//! Ordered, immutable set of endpoints shared by every router.
//!
//! Pool order is a contract: index 0 is the primary endpoint, the fallback
//! router always starts there and the failover router wraps around in this
//! order.

use std::sync::Arc;

use crate::endpoint::{display_name, Scheme};
use crate::error::RouterError;

/// One endpoint: its URI and the transport that reaches it.
pub struct EndpointDescriptor<T: ?Sized> {
    uri: String,
    name: String,
    transport: Arc<T>,
}

impl<T: ?Sized> EndpointDescriptor<T> {
    pub fn new(uri: impl Into<String>, transport: Arc<T>) -> Self {
        let uri = uri.into();
        let name = display_name(&uri);
        Self {
            uri,
            name,
            transport,
        }
    }

    /// The endpoint URI as configured. May contain credentials.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Redacted name, safe for logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}

impl<T: ?Sized> Clone for EndpointDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            uri: self.uri.clone(),
            name: self.name.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for EndpointDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("name", &self.name)
            .finish()
    }
}

/// Non-empty, read-only list of endpoints.
pub struct EndpointPool<T: ?Sized> {
    endpoints: Vec<EndpointDescriptor<T>>,
}

impl<T: ?Sized> EndpointPool<T> {
    /// Build a pool. Fails if `endpoints` is empty.
    pub fn new(endpoints: Vec<EndpointDescriptor<T>>) -> Result<Self, RouterError> {
        if endpoints.is_empty() {
            return Err(RouterError::Configuration(
                "endpoint pool needs at least one endpoint".into(),
            ));
        }
        Ok(Self { endpoints })
    }

    /// Build a pool from URIs, mapping each one to a transport through
    /// `factory`. Schemes are validated before the factory is called, and
    /// the first error aborts construction.
    pub fn from_uris<I, S, F>(uris: I, mut factory: F) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(&str, Scheme) -> Result<Arc<T>, RouterError>,
    {
        let mut endpoints = Vec::new();
        for uri in uris {
            let uri = uri.as_ref();
            let scheme = Scheme::parse(uri)?;
            let transport = factory(uri, scheme)?;
            tracing::debug!(endpoint = %display_name(uri), %scheme, "endpoint added to pool");
            endpoints.push(EndpointDescriptor::new(uri, transport));
        }
        Self::new(endpoints)
    }

    /// Number of endpoints. Never zero.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always `false`; kept for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&EndpointDescriptor<T>> {
        self.endpoints.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointDescriptor<T>> {
        self.endpoints.iter()
    }

    /// Configured URIs in pool order.
    pub fn uris(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.uri()).collect()
    }
}

impl<T: ?Sized> std::ops::Index<usize> for EndpointPool<T> {
    type Output = EndpointDescriptor<T>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.endpoints[index]
    }
}

impl<T: ?Sized> std::fmt::Debug for EndpointPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.endpoints.iter()).finish()
    }
}
