//! In-process transit encryption provider implementation.
//!
//! This module provides a transit-style encryption service and its keeper
//! adapter:
//! - Named AES-256-GCM keys held server-side; callers only ever see
//!   ciphertext
//! - Token-checked operations with typed, inspectable native errors
//! - A client that dials lazily: configuration is validated up front, the
//!   connection failure surfaces on the first operation
//! - A URL opener that deduplicates clients through the connection-identity
//!   cache
//!
//! The in-process server is intended for:
//! - Unit testing of drivebay consumers
//! - Development and prototyping
//! - Reference implementation for network secrets-service adapters

use crate::keeper::{Keeper, KeeperDriver};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use drivebay_core::{
    CancellationToken, ClientCache, ClientIdentity, ConfigurationError, ConnectionSpec,
    DriverError, ErrorKind,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "transit_tests.rs"]
mod tests;

/// Text form every ciphertext starts with; versioned for future rotation of
/// the sealing format.
const CIPHERTEXT_PREFIX: &str = "transit:v1:";

const NONCE_LEN: usize = 12;

// ============================================================================
// Native Error Types
// ============================================================================

/// Native errors reported by the transit service and its client.
///
/// These are the typed, inspectable values the error classifier pattern
/// matches against; portable callers only ever see the classified kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitError {
    #[error("connection refused: {address}")]
    ConnectionRefused { address: String },

    #[error("permission denied")]
    Authorization,

    #[error("no client token provided")]
    NoToken,

    #[error("encryption key not found: {name}")]
    KeyNotFound { name: String },

    #[error("invalid or corrupted ciphertext")]
    InvalidCiphertext,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Map a native transit error, or its absence, onto the portable error
/// kinds.
///
/// The semantic groupings are the provider-independent contract; the
/// constants on the left are this service's own. The match is exhaustive,
/// so a new transit error cannot be added without classifying it.
pub fn error_code(error: Option<&TransitError>) -> ErrorKind {
    match error {
        None => ErrorKind::Ok,
        Some(error) => classify(error),
    }
}

fn classify(error: &TransitError) -> ErrorKind {
    match error {
        TransitError::Authorization | TransitError::NoToken => ErrorKind::PermissionDenied,
        TransitError::KeyNotFound { .. } | TransitError::InvalidCiphertext => {
            ErrorKind::FailedPrecondition
        }
        TransitError::ConnectionRefused { .. } | TransitError::Internal(_) => ErrorKind::Unknown,
    }
}

/// Classify a native error and keep it attached for escape-hatch probing.
fn transit_error(error: TransitError) -> DriverError {
    DriverError::new(classify(&error), error.to_string()).with_native(error)
}

// ============================================================================
// In-Process Transit Server
// ============================================================================

/// An in-process transit encryption service.
///
/// Holds named symmetric keys and performs encryption as a service: key
/// material never leaves the server. Every operation is checked against the
/// root token generated at startup.
pub struct TransitServer {
    keys: RwLock<HashMap<String, Zeroizing<[u8; 32]>>>,
    root_token: String,
}

impl TransitServer {
    /// Start a server with a freshly generated root token.
    pub fn new() -> Arc<Self> {
        let mut token = [0u8; 16];
        rand::rng().fill_bytes(&mut token);
        Arc::new(Self {
            keys: RwLock::new(HashMap::new()),
            root_token: format!("s.{}", general_purpose::URL_SAFE_NO_PAD.encode(token)),
        })
    }

    /// Token generated at startup, for connecting clients.
    pub fn root_token(&self) -> &str {
        &self.root_token
    }

    fn check_token(&self, token: &str) -> Result<(), TransitError> {
        if token.is_empty() {
            return Err(TransitError::NoToken);
        }
        if token != self.root_token {
            return Err(TransitError::Authorization);
        }
        Ok(())
    }

    /// Create the named key, rotating it when it already exists.
    ///
    /// Rotation replaces the key material, so ciphertext sealed under the
    /// previous material no longer decrypts.
    pub async fn create_key(&self, token: &str, name: &str) -> Result<(), TransitError> {
        self.check_token(token)?;
        self.keys.write().await.insert(name.to_string(), new_key());
        debug!(key = name, "key created");
        Ok(())
    }

    /// Encrypt with the named key, creating it on first use.
    pub async fn encrypt(
        &self,
        token: &str,
        name: &str,
        plaintext: &[u8],
    ) -> Result<String, TransitError> {
        self.check_token(token)?;
        let mut keys = self.keys.write().await;
        let key = keys.entry(name.to_string()).or_insert_with(new_key);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|error| TransitError::Internal(error.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(format!(
            "{}{}",
            CIPHERTEXT_PREFIX,
            general_purpose::STANDARD.encode(blob)
        ))
    }

    /// Decrypt with the named key.
    pub async fn decrypt(
        &self,
        token: &str,
        name: &str,
        ciphertext: &str,
    ) -> Result<Vec<u8>, TransitError> {
        self.check_token(token)?;
        let keys = self.keys.read().await;
        let key = keys.get(name).ok_or_else(|| TransitError::KeyNotFound {
            name: name.to_string(),
        })?;

        let encoded = ciphertext
            .strip_prefix(CIPHERTEXT_PREFIX)
            .ok_or(TransitError::InvalidCiphertext)?;
        let blob = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| TransitError::InvalidCiphertext)?;
        if blob.len() < NONCE_LEN {
            return Err(TransitError::InvalidCiphertext);
        }
        let (nonce, sealed) = blob.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| TransitError::InvalidCiphertext)
    }
}

fn new_key() -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    rand::rng().fill_bytes(key.as_mut_slice());
    key
}

// Tokens and key material never appear in Debug output.
impl fmt::Debug for TransitServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitServer")
            .field("root_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Transit Client (the provider-native client)
// ============================================================================

/// Configuration for dialing a transit-capable secrets service.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TransitConfig {
    /// Service address.
    pub address: String,
    /// Client token presented on every operation.
    pub token: String,
}

impl fmt::Debug for TransitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitConfig")
            .field("address", &self.address)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Client for a transit-capable secrets service.
///
/// This is the provider-native client keeper drivers delegate to and expose
/// through the escape hatch. Dialing never connects: [`dial`] validates the
/// configuration and returns immediately, so the failure for an unreachable
/// address surfaces on the first operation rather than at construction.
///
/// [`dial`]: TransitClient::dial
pub struct TransitClient {
    config: TransitConfig,
    server: Option<Arc<TransitServer>>,
}

impl TransitClient {
    /// Prepare a client for the configured address without connecting.
    pub fn dial(config: TransitConfig) -> Result<Self, TransitError> {
        if config.token.is_empty() {
            return Err(TransitError::NoToken);
        }
        Ok(Self {
            config,
            server: None,
        })
    }

    /// Client bound to an in-process server, as tests and embedded setups
    /// use.
    pub fn connected(server: Arc<TransitServer>, token: impl Into<String>) -> Self {
        Self {
            config: TransitConfig {
                address: "in-process".to_string(),
                token: token.into(),
            },
            server: Some(server),
        }
    }

    /// Address this client was dialed for.
    pub fn address(&self) -> &str {
        &self.config.address
    }

    fn server(&self) -> Result<&Arc<TransitServer>, TransitError> {
        self.server
            .as_ref()
            .ok_or_else(|| TransitError::ConnectionRefused {
                address: self.config.address.clone(),
            })
    }

    /// Create (or rotate) the named key.
    pub async fn create_key(&self, name: &str) -> Result<(), TransitError> {
        self.server()?.create_key(&self.config.token, name).await
    }

    /// Encrypt `plaintext` under the named key.
    pub async fn encrypt(&self, key: &str, plaintext: &[u8]) -> Result<String, TransitError> {
        self.server()?
            .encrypt(&self.config.token, key, plaintext)
            .await
    }

    /// Decrypt `ciphertext` under the named key.
    pub async fn decrypt(&self, key: &str, ciphertext: &str) -> Result<Vec<u8>, TransitError> {
        self.server()?
            .decrypt(&self.config.token, key, ciphertext)
            .await
    }
}

impl fmt::Debug for TransitClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitClient")
            .field("config", &self.config)
            .field("connected", &self.server.is_some())
            .finish()
    }
}

// ============================================================================
// Driver Adapter
// ============================================================================

/// Keeper driver bound to one named key on a transit client.
pub struct TransitKeeper {
    client: Arc<TransitClient>,
    key_id: String,
}

impl TransitKeeper {
    /// Bind a keeper for `key_id` on `client`.
    pub fn new(client: Arc<TransitClient>, key_id: impl Into<String>) -> Self {
        Self {
            client,
            key_id: key_id.into(),
        }
    }

    /// Open a portable keeper for `key_id` on `client`.
    pub fn open(client: Arc<TransitClient>, key_id: impl Into<String>) -> Keeper {
        Keeper::new(Self::new(client, key_id))
    }
}

#[async_trait]
impl KeeperDriver for TransitKeeper {
    async fn encrypt(
        &self,
        cancel: &CancellationToken,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, DriverError> {
        if cancel.is_canceled() {
            return Err(DriverError::canceled());
        }
        tokio::select! {
            _ = cancel.canceled() => Err(DriverError::canceled()),
            result = self.client.encrypt(&self.key_id, plaintext) => {
                result.map(String::into_bytes).map_err(transit_error)
            }
        }
    }

    async fn decrypt(
        &self,
        cancel: &CancellationToken,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, DriverError> {
        if cancel.is_canceled() {
            return Err(DriverError::canceled());
        }
        let text = std::str::from_utf8(ciphertext)
            .map_err(|_| transit_error(TransitError::InvalidCiphertext))?;
        tokio::select! {
            _ = cancel.canceled() => Err(DriverError::canceled()),
            result = self.client.decrypt(&self.key_id, text) => result.map_err(transit_error),
        }
    }

    fn native(&self) -> Option<&(dyn Any + Send + Sync)> {
        Some(&self.client as &(dyn Any + Send + Sync))
    }
}

// ============================================================================
// URL Opener
// ============================================================================

const URL_SCHEME: &str = "transit";
const PARAM_ADDRESS: &str = "address";
const PARAM_TOKEN: &str = "token";

/// Connection spec the keeper opener dials clients through.
///
/// Identity is the `address` and `token` parameters only: the key name in
/// the URL path and parameters without connection relevance never force a
/// second dial.
pub struct TransitConnectionSpec;

/// Connection-relevant parameters of `url`; first value wins when a
/// parameter repeats.
fn connection_config(url: &Url) -> TransitConfig {
    let mut address = None;
    let mut token = None;
    for (name, value) in url.query_pairs() {
        if name == PARAM_ADDRESS && address.is_none() {
            address = Some(value.into_owned());
        } else if name == PARAM_TOKEN && token.is_none() {
            token = Some(value.into_owned());
        }
    }
    TransitConfig {
        address: address.unwrap_or_default(),
        token: token.unwrap_or_default(),
    }
}

#[async_trait]
impl ConnectionSpec for TransitConnectionSpec {
    type Connection = TransitClient;

    fn identity(&self, url: &Url) -> Result<ClientIdentity, ConfigurationError> {
        let config = connection_config(url);
        Ok(ClientIdentity::from_params([
            (PARAM_ADDRESS, config.address),
            (PARAM_TOKEN, config.token),
        ]))
    }

    async fn connect(&self, url: &Url) -> Result<TransitClient, ConfigurationError> {
        let config = connection_config(url);
        TransitClient::dial(config).map_err(|error| ConfigurationError::Invalid {
            message: error.to_string(),
        })
    }
}

/// Opens keepers from `transit://` configuration URLs.
///
/// URL form: `transit://<key-id>?address=<addr>&token=<tok>`. The opener is
/// constructed explicitly and owns its client cache; callers opt into
/// client sharing by sharing the opener.
pub struct KeeperOpener {
    cache: ClientCache<TransitConnectionSpec>,
}

impl KeeperOpener {
    /// Create an opener with an empty client cache.
    pub fn new() -> Self {
        Self {
            cache: ClientCache::new(TransitConnectionSpec),
        }
    }

    /// Open a keeper for the key `url` names.
    ///
    /// Configuration problems fail fast, before any client is dialed: a
    /// scheme other than `transit`, a missing key identifier, or a query
    /// parameter outside `address`/`token` is rejected. Repeating a
    /// recognized parameter is allowed; the first value wins.
    pub async fn open_keeper(&self, url: &Url) -> Result<Keeper, ConfigurationError> {
        if url.scheme() != URL_SCHEME {
            return Err(ConfigurationError::InvalidUrl {
                message: format!("unsupported scheme: {}", url.scheme()),
            });
        }
        for (name, _) in url.query_pairs() {
            if name != PARAM_ADDRESS && name != PARAM_TOKEN {
                return Err(ConfigurationError::UnknownParameter {
                    name: name.into_owned(),
                });
            }
        }
        let key_id = key_identifier(url)?;
        let client = self.cache.get(url).await?;
        debug!(key = key_id.as_str(), "opened keeper");
        Ok(TransitKeeper::open(client, key_id))
    }

    /// Client for `url`, dialed only when no equivalent client is cached.
    pub async fn cached_client(&self, url: &Url) -> Result<Arc<TransitClient>, ConfigurationError> {
        self.cache.get(url).await
    }

    /// Number of distinct clients dialed so far.
    pub async fn client_count(&self) -> usize {
        self.cache.len().await
    }
}

impl Default for KeeperOpener {
    fn default() -> Self {
        Self::new()
    }
}

/// Key identifier embedded in the URL: the host plus any path segments.
fn key_identifier(url: &Url) -> Result<String, ConfigurationError> {
    let host = url.host_str().unwrap_or_default();
    let path = url.path().trim_matches('/');
    let key = if path.is_empty() {
        host.to_string()
    } else if host.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", host, path)
    };
    if key.is_empty() {
        return Err(ConfigurationError::Missing {
            key: "key identifier".to_string(),
        });
    }
    Ok(key)
}
