//! Unit tests for error.rs

use crate::error::{Error, Result};

// ============================================================================
// DISPLAY
// ============================================================================

#[test]
fn test_out_of_memory_display() {
    assert_eq!(format!("{}", Error::OutOfMemory), "Out of GPU memory");
}

#[test]
fn test_display_carries_prefix_and_message() {
    let cases = [
        (Error::BackendError("vkQueueSubmit".to_string()), "Backend error"),
        (Error::InitializationFailed("no adapter".to_string()), "Initialization failed"),
        (Error::InvalidValue("empty name".to_string()), "Invalid value"),
        (Error::InvalidConfiguration("uniform + storage".to_string()), "Invalid configuration"),
        (Error::InvalidOperation("not recording".to_string()), "Invalid operation"),
        (Error::ValueOutOfRange("index 9000".to_string()), "Value out of range"),
        (Error::InvalidRange("offset 12 + size 8".to_string()), "Invalid range"),
        (Error::UnexpectedSize("2 attachments".to_string()), "Unexpected size"),
        (Error::UnexpectedType("metal buffer".to_string()), "Unexpected type"),
        (Error::UnsupportedFeature("x64 anisotropy".to_string()), "Unsupported feature"),
    ];

    for (err, prefix) in cases {
        let display = err.to_string();
        assert!(display.starts_with(prefix), "{} should start with {}", display, prefix);
    }
}

// ============================================================================
// KIND / TRAITS
// ============================================================================

#[test]
fn test_kind_names_variant() {
    assert_eq!(Error::OutOfMemory.kind(), "OutOfMemory");
    assert_eq!(Error::InvalidRange(String::new()).kind(), "InvalidRange");
    assert_eq!(Error::UnexpectedType(String::new()).kind(), "UnexpectedType");
}

#[test]
fn test_error_is_std_error() {
    let err = Error::InvalidValue("x".to_string());
    let dyn_err: &dyn std::error::Error = &err;
    assert!(dyn_err.source().is_none());
}

#[test]
fn test_error_equality() {
    assert_eq!(
        Error::InvalidValue("a".to_string()),
        Error::InvalidValue("a".to_string())
    );
    assert_ne!(
        Error::InvalidValue("a".to_string()),
        Error::InvalidConfiguration("a".to_string())
    );
}

#[test]
fn test_result_propagation() {
    fn inner() -> Result<u32> {
        Err(Error::ValueOutOfRange("level 4".to_string()))
    }
    fn outer() -> Result<u32> {
        let value = inner()?;
        Ok(value + 1)
    }

    assert!(matches!(outer(), Err(Error::ValueOutOfRange(_))));
}
