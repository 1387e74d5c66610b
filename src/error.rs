//! Error types for the Tidegate library.

use thiserror::Error;

/// Main error type for Tidegate operations.
#[derive(Error, Debug)]
pub enum TidegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tidegate operations.
pub type Result<T> = std::result::Result<T, TidegateError>;
