//! Tests for portable error kinds and classified errors.

use super::*;

#[test]
fn test_error_kind_retryability() {
    assert!(ErrorKind::ResourceExhausted.is_retryable());
    assert!(ErrorKind::DeadlineExceeded.is_retryable());

    assert!(!ErrorKind::Ok.is_retryable());
    assert!(!ErrorKind::Canceled.is_retryable());
    assert!(!ErrorKind::FailedPrecondition.is_retryable());
    assert!(!ErrorKind::PermissionDenied.is_retryable());
    assert!(!ErrorKind::Unknown.is_retryable());
}

#[test]
fn test_error_kind_display() {
    assert_eq!(ErrorKind::Canceled.to_string(), "canceled");
    assert_eq!(ErrorKind::FailedPrecondition.to_string(), "failed precondition");
    assert_eq!(ErrorKind::Unknown.to_string(), "unknown");
}

#[test]
fn test_driver_error_preserves_message() {
    let err = DriverError::new(ErrorKind::Unknown, "socket closed by peer");

    assert_eq!(err.kind(), ErrorKind::Unknown);
    assert_eq!(err.message(), "socket closed by peer");
    assert_eq!(err.to_string(), "unknown: socket closed by peer");
}

#[test]
fn test_canceled_error_has_no_native_value() {
    let err = DriverError::canceled();

    assert_eq!(err.kind(), ErrorKind::Canceled);
    // A canceled operation never reached the provider, so probing it for
    // any provider-native type must fail.
    assert!(err.native_as::<String>().is_none());
    assert!(err.native_as::<std::io::Error>().is_none());
}

#[test]
fn test_native_probe_requires_exact_type() {
    #[derive(Debug, PartialEq)]
    struct FakeProviderError(u32);

    let err = DriverError::new(ErrorKind::ResourceExhausted, "queue full")
        .with_native(FakeProviderError(7));

    assert_eq!(err.native_as::<FakeProviderError>(), Some(&FakeProviderError(7)));
    assert!(err.native_as::<String>().is_none());
    assert!(err.native_as::<u32>().is_none());
}

#[test]
fn test_driver_error_retryability_follows_kind() {
    assert!(DriverError::new(ErrorKind::ResourceExhausted, "slow consumer").is_retryable());
    assert!(!DriverError::canceled().is_retryable());
}

#[test]
fn test_configuration_error_display() {
    let err = ConfigurationError::UnknownParameter {
        name: "param".to_string(),
    };
    assert_eq!(err.to_string(), "unrecognized configuration parameter: param");
}
