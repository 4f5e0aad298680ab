//! Provider adapter implementations.
//!
//! This module contains concrete implementations of the `TopicDriver` and
//! `SubscriptionDriver` traits for different message brokers.

pub mod memory;

pub use memory::{MemoryBroker, MemorySubscription, MemoryTopic};
