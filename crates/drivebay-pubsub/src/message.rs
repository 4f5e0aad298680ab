//! Message types for portable publish/subscribe.

use bytes::Bytes;
use drivebay_core::AsNative;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Subject Names
// ============================================================================

/// Name of a publish/subscribe subject.
///
/// Deliberately unvalidated: each provider owns its subject grammar and
/// rejects malformed names at send/receive time, where the failure is
/// classified as [`ErrorKind::FailedPrecondition`]. Validating here would
/// mask that provider behavior.
///
/// [`ErrorKind::FailedPrecondition`]: drivebay_core::ErrorKind::FailedPrecondition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicName(String);

impl TopicName {
    /// Create a subject name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the subject name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TopicName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TopicName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// An outbound message: an opaque byte payload plus string-keyed metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(with = "bytes_serde")]
    pub body: Bytes,
    pub metadata: HashMap<String, String>,
}

/// Custom serialization for Bytes
mod bytes_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

impl Message {
    /// Create a new message with a body.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A message delivered to a subscription.
///
/// Alongside the payload and metadata, the provider's raw delivery object is
/// carried for acknowledgment and escape-hatch purposes. The portable layer
/// never owns that object: callers borrow it through [`AsNative::try_as`]
/// for as long as they hold the received message.
#[derive(Clone)]
pub struct ReceivedMessage {
    pub body: Bytes,
    pub metadata: HashMap<String, String>,
    native: Option<Arc<dyn Any + Send + Sync>>,
}

impl ReceivedMessage {
    /// Create a received message with no provider backing.
    pub fn new(body: impl Into<Bytes>, metadata: HashMap<String, String>) -> Self {
        Self {
            body: body.into(),
            metadata,
            native: None,
        }
    }

    /// Attach the provider's raw delivery object.
    pub fn with_native(mut self, native: impl Any + Send + Sync) -> Self {
        self.native = Some(Arc::new(native));
        self
    }
}

impl AsNative for ReceivedMessage {
    fn native(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.native.as_deref()
    }
}

impl fmt::Debug for ReceivedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("body_len", &self.body.len())
            .field("metadata", &self.metadata)
            .field("has_native", &self.native.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
