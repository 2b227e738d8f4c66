//! Error types for the ridechat core library.

use thiserror::Error;

/// Result type alias using the ridechat [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types shared by ridechat binaries.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
