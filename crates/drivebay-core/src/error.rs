//! Portable error kinds and the classified error value drivers return.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Portable classification of a provider failure.
///
/// Every provider adapter maps its native error constants onto these kinds,
/// so callers can write provider-agnostic handling code against a single
/// closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No error occurred.
    Ok,
    /// The caller canceled the operation before it completed.
    Canceled,
    /// The system is not in a state the operation requires: malformed
    /// subject, closed subscription or connection, missing key.
    FailedPrecondition,
    /// The provider rejected the caller's credentials.
    PermissionDenied,
    /// A quota, payload, buffer, or rate limit was exceeded.
    ResourceExhausted,
    /// The operation ran past its deadline or the provider timed out.
    DeadlineExceeded,
    /// Any other provider failure.
    Unknown,
}

impl ErrorKind {
    /// Check if an operation failing with this kind may be worth retrying.
    ///
    /// Retry policy belongs to the caller; the driver layer never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceExhausted | Self::DeadlineExceeded)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::Canceled => "canceled",
            Self::FailedPrecondition => "failed precondition",
            Self::PermissionDenied => "permission denied",
            Self::ResourceExhausted => "resource exhausted",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// A provider failure after classification.
///
/// Carries the portable kind, the provider's original message (kept even for
/// [`ErrorKind::Unknown`] so diagnostics survive classification), and the
/// provider-native error value for callers that need to inspect it through
/// [`DriverError::native_as`].
#[derive(Clone, Error)]
#[error("{kind}: {message}")]
pub struct DriverError {
    kind: ErrorKind,
    message: String,
    native: Option<Arc<dyn Any + Send + Sync>>,
}

impl DriverError {
    /// Create a classified error with no native value attached.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            native: None,
        }
    }

    /// The error every driver returns when the caller's cancellation signal
    /// fires before or during a provider call.
    ///
    /// Deliberately carries no native value: a canceled operation never
    /// reached the provider, so probing it for a provider error type fails.
    pub fn canceled() -> Self {
        Self::new(ErrorKind::Canceled, "operation canceled")
    }

    /// Attach the provider-native error value for escape-hatch inspection.
    pub fn with_native(mut self, native: impl Any + Send + Sync) -> Self {
        self.native = Some(Arc::new(native));
        self
    }

    /// Portable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message, preserving the provider's original text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Attempt to view the provider-native error value as a `T`.
    ///
    /// Returns `None` when no native value is attached or when `T` is not
    /// exactly the type the adapter stored. Never panics.
    pub fn native_as<T: Any>(&self) -> Option<&T> {
        self.native.as_deref().and_then(|native| native.downcast_ref::<T>())
    }

    /// Check if the caller may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Debug for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("has_native", &self.native.is_some())
            .finish()
    }
}

/// Errors raised while opening a driver from configuration.
///
/// These fail fast at open time, before any connection attempt, and never
/// leave a partially constructed handle behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("invalid configuration URL: {message}")]
    InvalidUrl { message: String },

    #[error("unrecognized configuration parameter: {name}")]
    UnknownParameter { name: String },

    #[error("missing required configuration: {key}")]
    Missing { key: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
