//! Tests for the escape-hatch capability query.

use super::*;
use std::sync::Arc;

struct FakeConn {
    address: String,
}

/// Wrapper exposing a shared connection handle, the way driver adapters do.
struct HandleWrapper {
    conn: Option<Arc<FakeConn>>,
}

impl AsNative for HandleWrapper {
    fn native(&self) -> Option<&(dyn std::any::Any + Send + Sync)> {
        self.conn
            .as_ref()
            .map(|conn| conn as &(dyn std::any::Any + Send + Sync))
    }
}

#[test]
fn test_try_as_matches_exact_type() {
    let wrapper = HandleWrapper {
        conn: Some(Arc::new(FakeConn {
            address: "broker-1".to_string(),
        })),
    };

    let conn = wrapper.try_as::<Arc<FakeConn>>().expect("handle probe should succeed");
    assert_eq!(conn.address, "broker-1");
}

#[test]
fn test_try_as_rejects_wrong_indirection() {
    let wrapper = HandleWrapper {
        conn: Some(Arc::new(FakeConn {
            address: "broker-1".to_string(),
        })),
    };

    // The driver exposes Arc<FakeConn>; asking for the value type must fail.
    assert!(wrapper.try_as::<FakeConn>().is_none());
    assert!(wrapper.try_as::<String>().is_none());
}

#[test]
fn test_try_as_on_sentinel_returns_none() {
    let wrapper = HandleWrapper { conn: None };

    assert!(wrapper.native().is_none());
    assert!(wrapper.try_as::<Arc<FakeConn>>().is_none());
}
