//! Connection-identity cache shared by URL-configured drivers.

use crate::error::ConfigurationError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Canonical identity of a provider connection derived from a configuration
/// URL.
///
/// Built from the connection-relevant query parameters only. Pairs are
/// sorted by name, then value, so parameter order in the URL never matters
/// and two URLs compare equal exactly when their parameter sets are equal.
/// The resource identifier in the URL path is deliberately not part of the
/// identity: one connection serves every resource reachable with the same
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Build an identity from connection-relevant `(name, value)` pairs.
    pub fn from_params<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut pairs: Vec<(String, String)> = params
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        pairs.sort();
        let canonical = pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");
        Self(canonical)
    }

    /// Get the canonical form as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How a cache identifies and dials connections for one provider.
#[async_trait]
pub trait ConnectionSpec: Send + Sync {
    /// The provider's client connection type.
    type Connection: Send + Sync;

    /// Canonical identity of the connection `url` describes.
    fn identity(&self, url: &Url) -> Result<ClientIdentity, ConfigurationError>;

    /// Establish a new connection for `url`, using the full parameter set.
    async fn connect(&self, url: &Url) -> Result<Self::Connection, ConfigurationError>;
}

/// Lazily dialing cache of provider connections keyed by canonical identity.
///
/// Entries are created on first use and live for the life of the cache; the
/// lookup-or-connect sequence runs under a single lock, so concurrent
/// callers presenting equivalent URLs observe exactly one connection.
pub struct ClientCache<S: ConnectionSpec> {
    spec: S,
    clients: Mutex<HashMap<ClientIdentity, Arc<S::Connection>>>,
}

impl<S: ConnectionSpec> ClientCache<S> {
    /// Create an empty cache dialing through `spec`.
    pub fn new(spec: S) -> Self {
        Self {
            spec,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Return the connection for `url`, dialing one only when no equivalent
    /// connection exists yet.
    ///
    /// Cache hits return the stored connection itself, not a copy: two calls
    /// with equivalent URLs yield `Arc`s pointing at the same client.
    pub async fn get(&self, url: &Url) -> Result<Arc<S::Connection>, ConfigurationError> {
        let identity = self.spec.identity(url)?;
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&identity) {
            debug!(identity = identity.as_str(), "connection cache hit");
            return Ok(Arc::clone(client));
        }
        debug!(identity = identity.as_str(), "connection cache miss, dialing");
        let client = Arc::new(self.spec.connect(url).await?);
        clients.insert(identity, Arc::clone(&client));
        Ok(client)
    }

    /// Number of distinct connections dialed so far.
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Check if no connection has been dialed yet.
    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
