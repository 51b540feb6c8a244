//! Error types for operator operations.

use thiserror::Error;

/// Errors that can occur in the operator service.
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Token encoding or decoding failed.
    #[error("Token codec error: {0}")]
    Codec(#[from] adnym_codec::CodecError),

    /// The opt-out store could not be consulted.
    #[error("Opt-out store error: {0}")]
    OptOut(String),

    /// The salt directory could not be consulted.
    #[error("Salt directory error: {0}")]
    Salt(String),

    /// The refresh-response envelope could not be built.
    #[error("Response envelope error: {0}")]
    Response(String),
}

/// Result type for operator operations.
pub type Result<T> = std::result::Result<T, OperatorError>;
