//! Driver traits and the portable wrappers application code holds.

use crate::message::{Message, ReceivedMessage};
use async_trait::async_trait;
use drivebay_core::{AsNative, CancellationToken, DriverError};
use std::any::Any;
use std::fmt;
use tracing::debug;

/// Provider adapter for outbound messages on one subject.
///
/// Implementations delegate to a provider's native client, classify native
/// failures into the portable error kinds, and expose the native connection
/// through [`native`]. Drivers never retry: a provider error is classified
/// and returned, and retry policy stays with the caller.
///
/// [`native`]: TopicDriver::native
#[async_trait]
pub trait TopicDriver: Send + Sync {
    /// Deliver `message` to the bound subject.
    ///
    /// Must observe `cancel` before and during the provider call and return
    /// an error of kind [`ErrorKind::Canceled`] promptly once it fires,
    /// rather than blocking or silently succeeding.
    ///
    /// [`ErrorKind::Canceled`]: drivebay_core::ErrorKind::Canceled
    async fn send(&self, cancel: &CancellationToken, message: &Message)
        -> Result<(), DriverError>;

    /// Provider-native connection handle, if one exists.
    fn native(&self) -> Option<&(dyn Any + Send + Sync)>;
}

/// Provider adapter for a consumable source of messages.
///
/// Lifecycle: created active, receives zero or more messages, then is
/// explicitly torn down with [`unsubscribe`]. Once closed, every further
/// receive fails with [`ErrorKind::FailedPrecondition`]; it never silently
/// blocks forever or returns stale data.
///
/// [`unsubscribe`]: SubscriptionDriver::unsubscribe
/// [`ErrorKind::FailedPrecondition`]: drivebay_core::ErrorKind::FailedPrecondition
#[async_trait]
pub trait SubscriptionDriver: Send + Sync {
    /// Block until a message arrives, `cancel` fires, or the provider
    /// reports an error.
    ///
    /// A canceled wait leaves the subscription intact: no message is lost
    /// and none is double-delivered on the next call.
    async fn receive(&self, cancel: &CancellationToken) -> Result<ReceivedMessage, DriverError>;

    /// Tear down the provider-side subscription.
    ///
    /// Safe to call once; afterwards the handle is consistently closed.
    async fn unsubscribe(&self) -> Result<(), DriverError>;

    /// Provider-native subscription handle, if one exists.
    fn native(&self) -> Option<&(dyn Any + Send + Sync)>;
}

/// Portable handle for publishing to one destination.
///
/// Immutable after creation; bound to a provider connection and a named
/// subject by the driver it wraps.
pub struct Topic {
    driver: Box<dyn TopicDriver>,
}

impl Topic {
    /// Wrap a provider adapter.
    pub fn new(driver: impl TopicDriver + 'static) -> Self {
        Self {
            driver: Box::new(driver),
        }
    }

    /// Deliver `message` to the destination this topic is bound to.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        message: &Message,
    ) -> Result<(), DriverError> {
        let result = self.driver.send(cancel, message).await;
        if let Err(err) = &result {
            debug!(kind = %err.kind(), "send failed");
        }
        result
    }
}

impl AsNative for Topic {
    fn native(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.driver.native()
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic").finish_non_exhaustive()
    }
}

/// Portable handle for consuming messages from one source.
pub struct Subscription {
    driver: Box<dyn SubscriptionDriver>,
}

impl Subscription {
    /// Wrap a provider adapter.
    pub fn new(driver: impl SubscriptionDriver + 'static) -> Self {
        Self {
            driver: Box::new(driver),
        }
    }

    /// Wait for the next message.
    pub async fn receive(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ReceivedMessage, DriverError> {
        let result = self.driver.receive(cancel).await;
        if let Err(err) = &result {
            debug!(kind = %err.kind(), "receive failed");
        }
        result
    }

    /// Tear down the subscription; further receives fail.
    pub async fn unsubscribe(&self) -> Result<(), DriverError> {
        self.driver.unsubscribe().await
    }
}

impl AsNative for Subscription {
    fn native(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.driver.native()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
