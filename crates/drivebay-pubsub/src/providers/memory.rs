//! In-process broker provider implementation.
//!
//! This module provides a fully functional in-process message broker that:
//! - Fans published messages out to all current subscribers of a subject
//! - Enforces subject grammar and payload limits at the provider boundary
//! - Marks overrun subscriptions as slow consumers instead of blocking
//! - Provides thread-safe concurrent access
//!
//! This provider is intended for:
//! - Unit testing of drivebay consumers
//! - Development and prototyping
//! - Reference implementation for network broker adapters
//!
//! Like the brokers it stands in for, delivery is at-most-once: a message
//! published while no subscription exists is dropped.

use crate::driver::{Subscription, SubscriptionDriver, Topic, TopicDriver};
use crate::message::{Message, ReceivedMessage, TopicName};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use drivebay_core::{CancellationToken, DriverError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Native Error Types
// ============================================================================

/// Native errors reported by the in-process broker.
///
/// These are the typed, inspectable values the error classifier pattern
/// matches against; portable callers only ever see the classified kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid subject")]
    BadSubject,

    #[error("invalid subscription")]
    BadSubscription,

    #[error("authorization violation")]
    Authorization,

    #[error("maximum payload size exceeded")]
    MaxPayload,

    #[error("slow consumer, messages dropped")]
    SlowConsumer,

    #[error("timeout")]
    Timeout,
}

/// Map a native broker error, or its absence, onto the portable error kinds.
///
/// The semantic groupings are the provider-independent contract; the
/// constants on the left are this broker's own. The match is exhaustive, so
/// a new broker error cannot be added without classifying it.
pub fn error_code(error: Option<&BrokerError>) -> ErrorKind {
    match error {
        None => ErrorKind::Ok,
        Some(error) => classify(error),
    }
}

fn classify(error: &BrokerError) -> ErrorKind {
    match error {
        BrokerError::ConnectionClosed | BrokerError::BadSubject | BrokerError::BadSubscription => {
            ErrorKind::FailedPrecondition
        }
        BrokerError::Authorization => ErrorKind::PermissionDenied,
        BrokerError::MaxPayload | BrokerError::SlowConsumer => ErrorKind::ResourceExhausted,
        BrokerError::Timeout => ErrorKind::DeadlineExceeded,
    }
}

/// Classify a native error and keep it attached for escape-hatch probing.
fn broker_error(error: BrokerError) -> DriverError {
    DriverError::new(classify(&error), error.to_string()).with_native(error)
}

// ============================================================================
// Broker Configuration
// ============================================================================

/// Tunables for an in-process broker.
///
/// Passed explicitly at construction; there is no process-wide default
/// broker or ambient configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Largest payload `publish` accepts, in bytes.
    pub max_payload: usize,
    /// Deliveries buffered per subscription before it is marked slow.
    pub subscription_buffer: usize,
    /// When set, connections must present this token.
    pub required_token: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_payload: 1024 * 1024, // 1MB
            subscription_buffer: 8192,
            required_token: None,
        }
    }
}

// ============================================================================
// In-Process Broker (the provider-native client)
// ============================================================================

/// Internal broker state shared by every connection and subscription.
#[derive(Debug)]
struct BrokerState {
    config: BrokerConfig,
    subjects: RwLock<HashMap<String, Vec<SubscriberEntry>>>,
    next_subscription_id: AtomicU64,
    shutdown: AtomicBool,
}

/// Registered delivery target for one subscription.
#[derive(Debug)]
struct SubscriberEntry {
    id: u64,
    sender: mpsc::Sender<Delivery>,
    slow: Arc<AtomicBool>,
}

/// An in-process message broker.
///
/// Owns the subject registry. Connections are obtained with [`connect`] (or
/// [`connect_with_token`] when the broker requires one) and share the
/// broker's state, so a message published on one connection reaches
/// subscribers on every other.
///
/// [`connect`]: MemoryBroker::connect
/// [`connect_with_token`]: MemoryBroker::connect_with_token
#[derive(Debug)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    /// Start a broker with the given configuration.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            state: Arc::new(BrokerState {
                config,
                subjects: RwLock::new(HashMap::new()),
                next_subscription_id: AtomicU64::new(1),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Connect without credentials.
    pub fn connect(&self) -> Result<Arc<BrokerConn>, BrokerError> {
        self.authenticate(None)
    }

    /// Connect presenting `token`.
    pub fn connect_with_token(&self, token: &str) -> Result<Arc<BrokerConn>, BrokerError> {
        self.authenticate(Some(token))
    }

    fn authenticate(&self, token: Option<&str>) -> Result<Arc<BrokerConn>, BrokerError> {
        if self.state.shutdown.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionClosed);
        }
        if let Some(required) = &self.state.config.required_token {
            if token != Some(required.as_str()) {
                return Err(BrokerError::Authorization);
            }
        }
        Ok(Arc::new(BrokerConn {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    /// Stop the broker.
    ///
    /// Existing connections fail with [`BrokerError::ConnectionClosed`] on
    /// their next operation and pending receives end.
    pub async fn shutdown(&self) {
        self.state.shutdown.store(true, Ordering::SeqCst);
        // Dropping the senders wakes every pending receive.
        self.state.subjects.write().await.clear();
        debug!("broker shut down");
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

/// A client connection to an in-process broker.
///
/// This is the provider-native connection object topic drivers expose
/// through the escape hatch.
#[derive(Debug)]
pub struct BrokerConn {
    state: Arc<BrokerState>,
    closed: AtomicBool,
}

impl BrokerConn {
    /// Publish a payload with headers to `subject`.
    ///
    /// Delivery is fan-out to all current subscribers; a subscriber whose
    /// buffer is full is marked slow and this delivery is dropped for it.
    pub async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        headers: HashMap<String, String>,
    ) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::ConnectionClosed);
        }
        if !valid_subject(subject) {
            return Err(BrokerError::BadSubject);
        }
        if payload.len() > self.state.config.max_payload {
            return Err(BrokerError::MaxPayload);
        }

        let delivery = Delivery {
            id: Uuid::new_v4().to_string(),
            subject: subject.to_string(),
            payload,
            headers,
            published_at: Utc::now(),
        };

        let subjects = self.state.subjects.read().await;
        if let Some(entries) = subjects.get(subject) {
            for entry in entries {
                match entry.sender.try_send(delivery.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        entry.slow.store(true, Ordering::SeqCst);
                        debug!(
                            subject,
                            subscription = entry.id,
                            "subscription buffer full, delivery dropped"
                        );
                    }
                    // Unsubscribed concurrently with this publish.
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                }
            }
        }
        Ok(())
    }

    /// Register a subscription for `subject`.
    pub async fn subscribe(&self, subject: &str) -> Result<Arc<BrokerSubscription>, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::ConnectionClosed);
        }
        if !valid_subject(subject) {
            return Err(BrokerError::BadSubject);
        }

        let (sender, receiver) = mpsc::channel(self.state.config.subscription_buffer);
        let id = self.state.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        let slow = Arc::new(AtomicBool::new(false));

        self.state
            .subjects
            .write()
            .await
            .entry(subject.to_string())
            .or_default()
            .push(SubscriberEntry {
                id,
                sender,
                slow: Arc::clone(&slow),
            });
        debug!(subject, subscription = id, "subscribed");

        Ok(Arc::new(BrokerSubscription {
            id,
            subject: subject.to_string(),
            receiver: Mutex::new(receiver),
            slow,
            active: AtomicBool::new(true),
            state: Arc::clone(&self.state),
        }))
    }

    /// Close this connection. Further operations fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Check if the connection or its broker has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.state.shutdown.load(Ordering::SeqCst)
    }
}

/// Raw delivery as the broker hands it to a subscriber.
///
/// This is the provider-native receipt object received messages expose
/// through the escape hatch.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: String,
    pub subject: String,
    pub payload: Bytes,
    pub headers: HashMap<String, String>,
    pub published_at: DateTime<Utc>,
}

/// An active subscription registered with the broker.
///
/// Provider-side state is owned exclusively by this handle: dropping or
/// unsubscribing it deregisters the delivery target.
#[derive(Debug)]
pub struct BrokerSubscription {
    id: u64,
    subject: String,
    receiver: Mutex<mpsc::Receiver<Delivery>>,
    slow: Arc<AtomicBool>,
    active: AtomicBool,
    state: Arc<BrokerState>,
}

impl BrokerSubscription {
    /// Wait for the next delivery, up to `timeout` when one is given.
    ///
    /// A subscription that overran its buffer reports
    /// [`BrokerError::SlowConsumer`] once before resuming with the
    /// deliveries that were retained.
    pub async fn next_msg(&self, timeout: Option<Duration>) -> Result<Delivery, BrokerError> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(BrokerError::BadSubscription);
        }
        if self.slow.swap(false, Ordering::SeqCst) {
            return Err(BrokerError::SlowConsumer);
        }

        let mut receiver = self.receiver.lock().await;
        let next = async { receiver.recv().await.ok_or(BrokerError::ConnectionClosed) };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, next)
                .await
                .map_err(|_| BrokerError::Timeout)?,
            None => next.await,
        }
    }

    /// Deregister from the broker. Further calls on this handle fail with
    /// [`BrokerError::BadSubscription`].
    pub async fn unsubscribe(&self) -> Result<(), BrokerError> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Err(BrokerError::BadSubscription);
        }
        let mut subjects = self.state.subjects.write().await;
        if let Some(entries) = subjects.get_mut(&self.subject) {
            entries.retain(|entry| entry.id != self.id);
            if entries.is_empty() {
                subjects.remove(&self.subject);
            }
        }
        debug!(subject = self.subject.as_str(), subscription = self.id, "unsubscribed");
        Ok(())
    }

    /// Subject this subscription is bound to.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Check if the subscription can still receive.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Subject grammar: dot-separated tokens, none empty, printable ASCII.
fn valid_subject(subject: &str) -> bool {
    !subject.is_empty()
        && subject
            .split('.')
            .all(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_graphic()))
}

// ============================================================================
// Driver Adapters
// ============================================================================

/// Topic driver bound to one subject on an in-process broker connection.
pub struct MemoryTopic {
    conn: Option<Arc<BrokerConn>>,
    subject: TopicName,
}

impl MemoryTopic {
    /// Bind a topic for `subject` on `conn`.
    pub fn new(conn: Arc<BrokerConn>, subject: impl Into<TopicName>) -> Self {
        Self {
            conn: Some(conn),
            subject: subject.into(),
        }
    }

    /// Sentinel topic standing in for a destination that does not exist.
    ///
    /// Every operation on it fails cleanly instead of panicking.
    pub fn nonexistent(subject: impl Into<TopicName>) -> Self {
        Self {
            conn: None,
            subject: subject.into(),
        }
    }

    /// Open a portable topic for `subject` on `conn`.
    pub fn open(conn: Arc<BrokerConn>, subject: impl Into<TopicName>) -> Topic {
        Topic::new(Self::new(conn, subject))
    }
}

#[async_trait]
impl TopicDriver for MemoryTopic {
    async fn send(
        &self,
        cancel: &CancellationToken,
        message: &Message,
    ) -> Result<(), DriverError> {
        if cancel.is_canceled() {
            return Err(DriverError::canceled());
        }
        let conn = match &self.conn {
            Some(conn) => conn,
            None => return Err(broker_error(BrokerError::ConnectionClosed)),
        };
        tokio::select! {
            _ = cancel.canceled() => Err(DriverError::canceled()),
            result = conn.publish(
                self.subject.as_str(),
                message.body.clone(),
                message.metadata.clone(),
            ) => result.map_err(broker_error),
        }
    }

    fn native(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.conn
            .as_ref()
            .map(|conn| conn as &(dyn Any + Send + Sync))
    }
}

/// Subscription driver bound to one subject on an in-process broker
/// connection.
pub struct MemorySubscription {
    subscription: Result<Arc<BrokerSubscription>, BrokerError>,
}

impl MemorySubscription {
    /// Bind a subscription for `subject` on `conn`.
    ///
    /// A rejected subject does not fail construction; the rejection
    /// re-surfaces, classified, on every receive.
    pub async fn new(conn: &BrokerConn, subject: impl Into<TopicName>) -> Self {
        let subject = subject.into();
        Self {
            subscription: conn.subscribe(subject.as_str()).await,
        }
    }

    /// Sentinel subscription standing in for a source that does not exist.
    pub fn nonexistent() -> Self {
        Self {
            subscription: Err(BrokerError::BadSubscription),
        }
    }

    /// Open a portable subscription for `subject` on `conn`.
    pub async fn open(conn: &BrokerConn, subject: impl Into<TopicName>) -> Subscription {
        Subscription::new(Self::new(conn, subject).await)
    }
}

#[async_trait]
impl SubscriptionDriver for MemorySubscription {
    async fn receive(&self, cancel: &CancellationToken) -> Result<ReceivedMessage, DriverError> {
        if cancel.is_canceled() {
            return Err(DriverError::canceled());
        }
        let subscription = self
            .subscription
            .as_ref()
            .map_err(|error| broker_error(error.clone()))?;
        tokio::select! {
            _ = cancel.canceled() => Err(DriverError::canceled()),
            result = subscription.next_msg(None) => {
                let delivery = result.map_err(broker_error)?;
                Ok(
                    ReceivedMessage::new(delivery.payload.clone(), delivery.headers.clone())
                        .with_native(Arc::new(delivery)),
                )
            }
        }
    }

    async fn unsubscribe(&self) -> Result<(), DriverError> {
        let subscription = self
            .subscription
            .as_ref()
            .map_err(|error| broker_error(error.clone()))?;
        subscription.unsubscribe().await.map_err(broker_error)
    }

    fn native(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.subscription
            .as_ref()
            .ok()
            .map(|subscription| subscription as &(dyn Any + Send + Sync))
    }
}
