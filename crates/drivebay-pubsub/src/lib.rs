//! # Drivebay PubSub
//!
//! Portable publish/subscribe layer with swappable provider adapters.
//!
//! Application code holds a [`Topic`] or [`Subscription`] and never touches a
//! provider client directly. Each provider adapter implements the driver
//! contract: it delegates to the provider's native client, classifies native
//! failures into the portable [`ErrorKind`] vocabulary, and exposes the
//! native handles through the escape hatch for callers that need
//! provider-specific features.
//!
//! ## Module Organization
//!
//! - [`message`] - Message structures and subject names
//! - [`driver`] - Driver traits and the portable wrappers
//! - [`providers`] - Provider adapter implementations
//!
//! [`ErrorKind`]: drivebay_core::ErrorKind

// Module declarations
pub mod driver;
pub mod message;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use driver::{Subscription, SubscriptionDriver, Topic, TopicDriver};
pub use message::{Message, ReceivedMessage, TopicName};
pub use providers::memory::{
    BrokerConfig, BrokerConn, BrokerError, BrokerSubscription, Delivery, MemoryBroker,
    MemorySubscription, MemoryTopic,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
