//! Tests for the keeper trait and portable wrapper.

use super::*;
use drivebay_core::ErrorKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Keeper driver that reverses bytes instead of talking to a provider.
struct StubKeeper {
    operations: Arc<AtomicUsize>,
    fail_with: Option<ErrorKind>,
}

#[async_trait]
impl KeeperDriver for StubKeeper {
    async fn encrypt(
        &self,
        cancel: &CancellationToken,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, DriverError> {
        if cancel.is_canceled() {
            return Err(DriverError::canceled());
        }
        self.operations.fetch_add(1, Ordering::SeqCst);
        match self.fail_with {
            Some(kind) => Err(DriverError::new(kind, "stub failure")),
            None => Ok(plaintext.iter().rev().copied().collect()),
        }
    }

    async fn decrypt(
        &self,
        cancel: &CancellationToken,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, DriverError> {
        self.encrypt(cancel, ciphertext).await
    }

    fn native(&self) -> Option<&(dyn Any + Send + Sync)> {
        None
    }
}

#[tokio::test]
async fn test_keeper_delegates_to_driver() {
    let operations = Arc::new(AtomicUsize::new(0));
    let keeper = Keeper::new(StubKeeper {
        operations: Arc::clone(&operations),
        fail_with: None,
    });
    let cancel = CancellationToken::new();

    let ciphertext = keeper
        .encrypt(&cancel, b"abc")
        .await
        .expect("stub encrypt should succeed");
    assert_eq!(ciphertext, b"cba");

    let plaintext = keeper
        .decrypt(&cancel, &ciphertext)
        .await
        .expect("stub decrypt should succeed");
    assert_eq!(plaintext, b"abc");

    assert_eq!(operations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_keeper_surfaces_driver_errors_unchanged() {
    let keeper = Keeper::new(StubKeeper {
        operations: Arc::new(AtomicUsize::new(0)),
        fail_with: Some(ErrorKind::PermissionDenied),
    });
    let cancel = CancellationToken::new();

    let error = keeper
        .encrypt(&cancel, b"abc")
        .await
        .expect_err("stub failure should surface");
    assert_eq!(error.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn test_keeper_without_native_backing_answers_no_probe() {
    let keeper = Keeper::new(StubKeeper {
        operations: Arc::new(AtomicUsize::new(0)),
        fail_with: None,
    });

    assert!(keeper.native().is_none());
    assert!(keeper.try_as::<String>().is_none());
}
