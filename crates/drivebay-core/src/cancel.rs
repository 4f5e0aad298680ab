//! Cancellation signal threaded through every blocking driver operation.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation signal.
///
/// Clones share one signal: once any clone calls [`cancel`], every pending
/// [`canceled`] wait resolves and [`is_canceled`] reports true from then on.
/// Cancellation is sticky and cannot be undone.
///
/// Drivers are contractually obligated to check the token before a provider
/// call and to select on [`canceled`] during any wait, returning
/// [`ErrorKind::Canceled`] promptly once it fires.
///
/// [`cancel`]: CancellationToken::cancel
/// [`canceled`]: CancellationToken::canceled
/// [`is_canceled`]: CancellationToken::is_canceled
/// [`ErrorKind::Canceled`]: crate::error::ErrorKind::Canceled
#[derive(Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a token in the not-canceled state.
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        // Send only fails when no receiver exists; self holds one.
        let _ = self.sender.send(true);
    }

    /// Check the signal without waiting.
    pub fn is_canceled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until the token is canceled.
    pub async fn canceled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Sender dropped; self keeps it alive, so this is unreachable
                // while the token exists.
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
