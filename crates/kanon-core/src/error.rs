//! Error types for Kanon core operations.
//!
//! This module defines the error types used throughout the `kanon-core` crate.

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Kanon core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Enforcement action is not one Gatekeeper understands.
    #[error("enforcement action ({action}) is invalid in policy: {path}")]
    InvalidEnforcement {
        /// The offending action.
        action: String,
        /// Policy source path.
        path: String,
    },

    /// Severity name could not be parsed.
    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
