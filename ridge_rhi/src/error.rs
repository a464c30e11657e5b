//! Error types for the Ridge RHI
//!
//! Every fallible operation of the core contracts and of the backends returns
//! [`Result`]. Errors are logged at the point they are created (see the
//! `ridge_err!` family of macros), so callers usually only need to propagate.

use std::fmt;

/// Result type for Ridge RHI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ridge RHI errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific failure (Vulkan, Metal) with no better classification
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Context, device or swapchain initialization failed
    InitializationFailed(String),

    /// A single argument holds a value that is never accepted (empty name, zero size, ...)
    InvalidValue(String),

    /// A combination of otherwise valid arguments is contradictory
    InvalidConfiguration(String),

    /// The call is not allowed in the object's current state
    InvalidOperation(String),

    /// An index or level lies outside the valid domain
    ValueOutOfRange(String),

    /// An `offset + size` style range does not fit inside its container
    InvalidRange(String),

    /// A count or byte size does not match what was expected
    UnexpectedSize(String),

    /// A resource belongs to another backend or is of the wrong kind
    UnexpectedType(String),

    /// The device or the running platform cannot do what was asked
    UnsupportedFeature(String),
}

impl Error {
    /// Short name of the error kind, without its message
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BackendError(_) => "BackendError",
            Error::OutOfMemory => "OutOfMemory",
            Error::InitializationFailed(_) => "InitializationFailed",
            Error::InvalidValue(_) => "InvalidValue",
            Error::InvalidConfiguration(_) => "InvalidConfiguration",
            Error::InvalidOperation(_) => "InvalidOperation",
            Error::ValueOutOfRange(_) => "ValueOutOfRange",
            Error::InvalidRange(_) => "InvalidRange",
            Error::UnexpectedSize(_) => "UnexpectedSize",
            Error::UnexpectedType(_) => "UnexpectedType",
            Error::UnsupportedFeature(_) => "UnsupportedFeature",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            Error::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
            Error::ValueOutOfRange(msg) => write!(f, "Value out of range: {}", msg),
            Error::InvalidRange(msg) => write!(f, "Invalid range: {}", msg),
            Error::UnexpectedSize(msg) => write!(f, "Unexpected size: {}", msg),
            Error::UnexpectedType(msg) => write!(f, "Unexpected type: {}", msg),
            Error::UnsupportedFeature(msg) => write!(f, "Unsupported feature: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
