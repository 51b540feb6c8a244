//! Pure classification of an identity envelope against a point in time.
//!
//! No I/O and no clock access: the current instant is a parameter, which
//! keeps every lifecycle decision reproducible in tests.

use crate::envelope::IdentityEnvelope;

/// Lifecycle state derived from an envelope and the current instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityState {
    /// No envelope is present.
    NoIdentity,
    /// The envelope failed structural validation.
    Invalid,
    /// The refresh credential is dead; only a fresh login recovers.
    RefreshExpired,
    /// The advertising token is expired but the refresh credential may
    /// still recover the identity.
    Expired,
    /// The advertising token is servable.
    Established {
        /// Whether a background refresh is due.
        refresh_due: bool,
    },
}

impl IdentityState {
    /// Whether this state is terminal without a fresh login.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IdentityState::NoIdentity | IdentityState::Invalid | IdentityState::RefreshExpired
        )
    }
}

/// Classify an envelope by its timestamps.
pub fn classify(envelope: Option<&IdentityEnvelope>, now_ms: u64) -> IdentityState {
    let Some(envelope) = envelope else {
        return IdentityState::NoIdentity;
    };
    if !envelope.is_valid() {
        return IdentityState::Invalid;
    }
    if now_ms >= envelope.refresh_expires {
        return IdentityState::RefreshExpired;
    }
    if now_ms >= envelope.identity_expires {
        return IdentityState::Expired;
    }
    IdentityState::Established {
        refresh_due: now_ms >= envelope.refresh_from,
    }
}

/// Whether the advertising token may be handed to callers right now.
pub fn token_returnable(envelope: Option<&IdentityEnvelope>, now_ms: u64) -> bool {
    matches!(
        classify(envelope, now_ms),
        IdentityState::Established { .. }
    )
}
