//! Keeper driver trait and the portable wrapper.

use async_trait::async_trait;
use drivebay_core::{AsNative, CancellationToken, DriverError};
use std::any::Any;
use std::fmt;
use tracing::debug;

/// Provider adapter wrapping an encrypt/decrypt capability bound to a named
/// key.
///
/// Implementations delegate to a provider's cryptographic service and
/// classify native failures into the portable error kinds. Construction may
/// happen without an established connection; the first real operation is
/// where connection failure becomes observable, and it fails loudly rather
/// than returning empty output.
#[async_trait]
pub trait KeeperDriver: Send + Sync {
    /// Encrypt `plaintext` with the bound key.
    async fn encrypt(
        &self,
        cancel: &CancellationToken,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, DriverError>;

    /// Decrypt `ciphertext` with the bound key.
    async fn decrypt(
        &self,
        cancel: &CancellationToken,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, DriverError>;

    /// Provider-native client handle, if one exists.
    fn native(&self) -> Option<&(dyn Any + Send + Sync)>;
}

/// Portable handle for encrypting and decrypting with one named key.
pub struct Keeper {
    driver: Box<dyn KeeperDriver>,
}

impl Keeper {
    /// Wrap a provider adapter.
    pub fn new(driver: impl KeeperDriver + 'static) -> Self {
        Self {
            driver: Box::new(driver),
        }
    }

    /// Encrypt `plaintext` with the key this keeper is bound to.
    pub async fn encrypt(
        &self,
        cancel: &CancellationToken,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, DriverError> {
        let result = self.driver.encrypt(cancel, plaintext).await;
        if let Err(err) = &result {
            debug!(kind = %err.kind(), "encrypt failed");
        }
        result
    }

    /// Decrypt `ciphertext` with the key this keeper is bound to.
    pub async fn decrypt(
        &self,
        cancel: &CancellationToken,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, DriverError> {
        let result = self.driver.decrypt(cancel, ciphertext).await;
        if let Err(err) = &result {
            debug!(kind = %err.kind(), "decrypt failed");
        }
        result
    }
}

impl AsNative for Keeper {
    fn native(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.driver.native()
    }
}

impl fmt::Debug for Keeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keeper").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "keeper_tests.rs"]
mod tests;
