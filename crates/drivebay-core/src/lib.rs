//! # Drivebay Core
//!
//! Provider-independent building blocks shared by every Drivebay driver:
//! the portable error-kind vocabulary, the escape hatch for reaching
//! provider-native values, the cancellation signal threaded through blocking
//! operations, and the connection-identity cache used by URL-configured
//! drivers.
//!
//! ## Module Organization
//!
//! - [`error`] - Portable error kinds and the classified error value
//! - [`escape`] - Capability query for provider-native handles
//! - [`cancel`] - Cancellation token for blocking driver operations
//! - [`cache`] - Connection-identity cache (lazy dialer)

// Module declarations
pub mod cache;
pub mod cancel;
pub mod error;
pub mod escape;

// Re-export commonly used types at crate root for convenience
pub use cache::{ClientCache, ClientIdentity, ConnectionSpec};
pub use cancel::CancellationToken;
pub use error::{ConfigurationError, DriverError, ErrorKind};
pub use escape::AsNative;
