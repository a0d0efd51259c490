//! # Error Types
//!
//! Unified error handling for the classifier core.
//!
//! The core never terminates the process: configuration problems,
//! serialization failures and exhausted covering attempts are all surfaced
//! as [`XcsfError`] values and the embedding loop decides what to do.

use thiserror::Error;

/// Main error type for classifier-core operations
#[derive(Error, Debug)]
pub enum XcsfError {
    /// Configuration error (missing/invalid key, invalid layer arguments)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error (short read, inconsistent length prefix)
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Contract violation signalling a caller bug
    #[error("Contract violation: {0}")]
    Contract(String),

    /// Covering failed to produce a matching substrate
    #[error("Covering failed after {trials} attempts")]
    Covering { trials: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for classifier-core operations
pub type XcsfResult<T> = Result<T, XcsfError>;

impl XcsfError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a contract-violation error
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Contract(msg.into())
    }
}
