//! Error types for the client core.

use thiserror::Error;

use crate::config::ConfigError;

/// Terminal outcomes delivered to waiting token requests.
///
/// Every queued or immediate token request resolves with either an
/// advertising token or exactly one of these. The variant is the
/// machine-readable kind; `Display` is the human-readable message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Initialisation completed without a usable identity.
    #[error("initialisation completed without a usable identity")]
    InitFailed,

    /// The identity expired and the last refresh attempt failed; a retry is
    /// scheduled and a later request may succeed.
    #[error("identity temporarily unavailable; refresh retry scheduled")]
    TemporarilyUnavailable,

    /// The server reported the user opted out of the identity service.
    #[error("user has opted out of the identity service")]
    OptOut,

    /// The refresh token expired; only a fresh login can recover.
    #[error("refresh token has expired; a new login is required")]
    RefreshExpired,

    /// The host tore the client down.
    #[error("client has been disconnected")]
    Disconnected,
}

/// Errors surfaced by client operations themselves (not by token requests).
#[derive(Error, Debug)]
pub enum ClientError {
    /// `init` was called a second time on the same instance.
    #[error("init may only be called once per client instance")]
    AlreadyInitialized,

    /// The supplied init options failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
