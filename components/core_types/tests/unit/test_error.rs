//! Unit tests for guest error types

use core_types::{ErrorKind, GuestError};

#[test]
fn test_error_kinds_are_distinct() {
    let kinds = [
        ErrorKind::TypeError,
        ErrorKind::StackOverflow,
        ErrorKind::UnknownCallTarget,
        ErrorKind::InternalError,
    ];
    for (i, a) in kinds.iter().enumerate() {
        for b in &kinds[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_guest_error_display() {
    let error = GuestError::new(ErrorKind::StackOverflow, "depth 257 exceeds 256");
    assert_eq!(error.to_string(), "StackOverflow: depth 257 exceeds 256");
}

#[test]
fn test_guest_error_is_std_error() {
    fn takes_error(_: &dyn std::error::Error) {}
    let error = GuestError::type_error("expected Bool");
    takes_error(&error);
    assert_eq!(error.kind, ErrorKind::TypeError);
}

#[test]
fn test_guest_error_equality() {
    let a = GuestError::internal("x");
    let b = GuestError::internal("x");
    assert_eq!(a, b);
    assert_ne!(a, GuestError::type_error("x"));
}
