//! # Drivebay Secrets
//!
//! Portable encrypt/decrypt layer with swappable provider adapters.
//!
//! Application code holds a [`Keeper`] bound to a named key and never
//! touches a secrets service directly. Each provider adapter implements the
//! driver contract: it delegates to the provider's native client, classifies
//! native failures into the portable [`ErrorKind`] vocabulary, and exposes
//! the native client through the escape hatch.
//!
//! Keepers opened from a configuration URL share client connections through
//! the connection-identity cache: equivalent URLs resolve to one dialed
//! client regardless of parameter order or the key name in the path.
//!
//! ## Module Organization
//!
//! - [`keeper`] - Keeper driver trait and the portable wrapper
//! - [`providers`] - Provider adapter implementations
//!
//! [`ErrorKind`]: drivebay_core::ErrorKind

// Module declarations
pub mod keeper;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use keeper::{Keeper, KeeperDriver};
pub use providers::transit::{
    KeeperOpener, TransitClient, TransitConfig, TransitError, TransitKeeper, TransitServer,
};
