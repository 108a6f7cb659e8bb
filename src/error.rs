//! Error types for the Floodgate library.

use thiserror::Error;

/// Main error type for Floodgate operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FloodgateError {
    /// Malformed duration expression
    #[error("Unrecognized duration {value:?}. Expected format: <number><unit> with unit one of ms|s|m|h, e.g. '1s'")]
    InvalidDuration {
        /// The offending input, rendered for the message
        value: String,
    },

    /// Structurally invalid rate limit configuration
    #[error("Invalid rate limit options: {0}")]
    InvalidOptions(String),

    /// A queued request was cancelled before it was admitted
    #[error("request cancelled: {0}")]
    Cancelled(String),
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
