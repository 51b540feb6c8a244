//! Callback status taxonomy and payload.
//!
//! The host supplies one callback at `init`; the manager invokes it exactly
//! once per externally observable transition, always before the waiter
//! queue drains.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::envelope::IdentityEnvelope;

/// Status values surfaced verbatim to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityStatus {
    /// A usable identity was adopted at init.
    Established,
    /// A refresh produced a new identity.
    Refreshed,
    /// The identity expired and the last refresh attempt failed; retrying.
    Expired,
    /// Init found no identity at all.
    NoIdentity,
    /// The supplied envelope failed validation.
    Invalid,
    /// The refresh credential is dead.
    RefreshExpired,
    /// The user opted out of the identity service.
    Optout,
    /// The user opted back in.
    Optin,
}

impl IdentityStatus {
    /// The wire spelling of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Established => "ESTABLISHED",
            IdentityStatus::Refreshed => "REFRESHED",
            IdentityStatus::Expired => "EXPIRED",
            IdentityStatus::NoIdentity => "NO_IDENTITY",
            IdentityStatus::Invalid => "INVALID",
            IdentityStatus::RefreshExpired => "REFRESH_EXPIRED",
            IdentityStatus::Optout => "OPTOUT",
            IdentityStatus::Optin => "OPTIN",
        }
    }
}

impl std::fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload handed to the host callback.
///
/// The advertising token is present under both the snake_case and camelCase
/// keys; consumers migrated at different times and both spellings remain
/// until the consumer contract settles.
#[derive(Clone, Debug, Serialize)]
pub struct StatusPayload {
    /// The advertising token, when one is returnable.
    pub advertising_token: Option<String>,
    /// The same token under its legacy spelling.
    #[serde(rename = "advertisingToken")]
    pub advertising_token_compat: Option<String>,
    /// The transition status.
    pub status: IdentityStatus,
    /// Human-readable description of the transition.
    #[serde(rename = "statusText")]
    pub status_text: String,
    /// The current envelope, when the token is returnable.
    pub identity: Option<IdentityEnvelope>,
}

impl StatusPayload {
    /// Build a payload; the token is mirrored into both spellings.
    pub fn new(
        status: IdentityStatus,
        status_text: impl Into<String>,
        token: Option<String>,
        identity: Option<IdentityEnvelope>,
    ) -> Self {
        Self {
            advertising_token_compat: token.clone(),
            advertising_token: token,
            status,
            status_text: status_text.into(),
            identity,
        }
    }
}

/// Host-supplied transition callback.
pub type StatusCallback = Arc<dyn Fn(StatusPayload) + Send + Sync>;
