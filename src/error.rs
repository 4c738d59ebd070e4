//! Error types for the Turnstile service.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Turnstile operations.
///
/// Over-limit and invalid-interval outcomes are not errors; they are
/// [`Decision`](crate::ratelimit::Decision) values. Anything surfacing here
/// must fail the protected request closed.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence failures while hydrating or recording limiter state
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An actor operation could not run to completion
    #[error("Internal error: {0}")]
    Internal(String),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for TurnstileError {
    fn from(err: ::config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
