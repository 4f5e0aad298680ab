//! Provider adapter implementations.
//!
//! This module contains concrete implementations of the `KeeperDriver` trait
//! for different secrets services.

pub mod transit;

pub use transit::{KeeperOpener, TransitClient, TransitKeeper, TransitServer};
