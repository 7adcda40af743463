//! Security-specific error types.

use thiserror::Error;

/// Security-related errors.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Permission denied for the requested operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid grant string format.
    #[error("invalid grant format: {0}")]
    InvalidGrantFormat(String),
}

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;
