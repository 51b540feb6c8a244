//! Error types for token encoding and decoding.

use thiserror::Error;

/// Errors that can occur while encoding or decoding tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A token referenced a key id the directory does not know.
    #[error("Unknown encryption key id: {id}")]
    UnknownKey {
        /// The embedded key id that could not be resolved.
        id: u32,
    },

    /// No site key is currently active for the requested site.
    #[error("No active site key for site {site_id}")]
    NoActiveSiteKey {
        /// The site the key was requested for.
        site_id: u32,
    },

    /// The directory holds no master key.
    #[error("Key directory has no master key")]
    NoMasterKey,

    /// Raw key material had the wrong length.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// The required key length.
        expected: usize,
        /// The length that was provided.
        actual: usize,
    },

    /// The token bytes did not match the expected layout.
    #[error("Malformed token: {0}")]
    Malformed(&'static str),

    /// The outermost base64 envelope could not be decoded.
    #[error("Invalid base64 envelope")]
    Base64,

    /// An encryption layer could not be sealed.
    #[error("Encryption failed")]
    Encryption,

    /// An encryption layer could not be opened (wrong key or tampering).
    #[error("Decryption failed")]
    Decryption,
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
