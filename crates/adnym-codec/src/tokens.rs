//! Token model types.
//!
//! Three token shapes share one inner identity payload. All timestamps are
//! milliseconds since the Unix epoch.

/// The token format version currently produced and accepted.
pub const TOKEN_VERSION: u8 = 2;

/// The pseudonymous user identity embedded inside every token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    /// The pseudonymous id (a salted-hash derivation, opaque here).
    pub id: String,
    /// The site the identity was established on.
    pub site_id: u32,
    /// Privacy flag bits recorded at establishment.
    pub privacy_bits: u32,
    /// When the identity was first established.
    pub established_at: u64,
}

impl UserIdentity {
    /// Create a new identity record.
    pub fn new(id: impl Into<String>, site_id: u32, privacy_bits: u32, established_at: u64) -> Self {
        Self {
            id: id.into(),
            site_id,
            privacy_bits,
            established_at,
        }
    }
}

/// The short-lived token applications attach to bid requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvertisingToken {
    /// Token format version.
    pub version: u8,
    /// When this token object was created. Not part of the encoded bytes;
    /// re-stamped on decode.
    pub created_at: u64,
    /// When the token stops being servable.
    pub expires_at: u64,
    /// The embedded identity.
    pub identity: UserIdentity,
}

impl AdvertisingToken {
    /// Create a token at the current format version.
    pub fn new(created_at: u64, expires_at: u64, identity: UserIdentity) -> Self {
        Self {
            version: TOKEN_VERSION,
            created_at,
            expires_at,
            identity,
        }
    }
}

/// The site-scoped identity token handed to first parties.
///
/// Encode-only: its byte layout carries just the version and the site-sealed
/// identity, so nothing in the system decodes it back into this shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserToken {
    /// Token format version.
    pub version: u8,
    /// When this token object was created.
    pub created_at: u64,
    /// When the token stops being servable.
    pub expires_at: u64,
    /// The embedded identity.
    pub identity: UserIdentity,
    /// Secondary privacy flag bits.
    pub privacy_bits2: u32,
}

impl UserToken {
    /// Create a token at the current format version.
    pub fn new(
        created_at: u64,
        expires_at: u64,
        identity: UserIdentity,
        privacy_bits2: u32,
    ) -> Self {
        Self {
            version: TOKEN_VERSION,
            created_at,
            expires_at,
            identity,
            privacy_bits2,
        }
    }
}

/// The credential presented to the refresh endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshToken {
    /// Token format version.
    pub version: u8,
    /// When the token was minted.
    pub created_at: u64,
    /// When the advertising identity minted alongside it expires.
    pub expires_at: u64,
    /// When the refresh credential itself stops being honored.
    pub valid_till: u64,
    /// The embedded identity (the first-level key, not the advertising id).
    pub identity: UserIdentity,
}

impl RefreshToken {
    /// Create a token at the current format version.
    pub fn new(created_at: u64, expires_at: u64, valid_till: u64, identity: UserIdentity) -> Self {
        Self {
            version: TOKEN_VERSION,
            created_at,
            expires_at,
            valid_till,
            identity,
        }
    }
}
