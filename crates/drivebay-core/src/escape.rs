//! Capability query for reaching provider-native values through portable
//! wrappers.

use std::any::Any;

/// Escape hatch implemented by every portable wrapper kind.
///
/// Lets advanced callers reach provider-specific features without widening
/// the portable interface. The query succeeds only when the requested type
/// is exactly the concrete type the driver exposes, indirection included: a
/// driver that exposes an `Arc<Conn>` handle does not answer a probe for a
/// `Conn` value, and vice versa.
pub trait AsNative {
    /// The provider-native value behind this wrapper, if the driver exposes
    /// one. Sentinel handles with no provider backing return `None`.
    fn native(&self) -> Option<&(dyn Any + Send + Sync)>;

    /// Attempt to view the provider-native value as a `T`.
    ///
    /// Returns `None` on any mismatch; never panics.
    fn try_as<T: Any>(&self) -> Option<&T> {
        self.native().and_then(|native| native.downcast_ref::<T>())
    }
}

#[cfg(test)]
#[path = "escape_tests.rs"]
mod tests;
