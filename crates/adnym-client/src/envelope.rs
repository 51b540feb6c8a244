//! The identity envelope: the unit persisted and exchanged.
//!
//! An envelope bundles the advertising token, the refresh credential, the
//! three lifecycle timestamps, and the key that decrypts the next refresh
//! response. Envelopes arrive from three ingress points - the host's `init`
//! call, the cookie, and the refresh endpoint - and every ingress runs the
//! same normalization and validation.
//!
//! ## Timestamp normalization
//!
//! Historically some producers emitted `refresh_expires` in seconds while
//! the other fields were milliseconds. Magnitudes below 10^11 cannot be
//! millisecond timestamps of any plausible date, so such values are treated
//! as seconds and scaled up; magnitudes too small to be second timestamps
//! are left alone. Normalization is applied to all three fields and is
//! idempotent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Values below this magnitude are second-resolution timestamps.
const MS_MAGNITUDE_THRESHOLD: u64 = 100_000_000_000;

/// Smallest value treated as a second-resolution timestamp. Anything below
/// this is nonsense in either unit and is left untouched, which keeps
/// normalization idempotent.
const SECONDS_MAGNITUDE_FLOOR: u64 = 100_000_000;

/// Errors raised by envelope ingress validation.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// The envelope was not valid JSON.
    #[error("envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The cookie value was not valid URL encoding.
    #[error("envelope cookie value is not valid URL encoding")]
    Encoding,

    /// A required string field was empty.
    #[error("envelope field '{field}' is empty")]
    EmptyField {
        /// The offending field.
        field: &'static str,
    },

    /// The timestamps violate `refresh_from <= identity_expires <= refresh_expires`.
    #[error("envelope timestamps are out of order")]
    TimestampOrder,
}

/// The bundle of advertising token, refresh credential, lifecycle
/// timestamps, and refresh-response key.
///
/// All timestamps are milliseconds since the Unix epoch once normalized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEnvelope {
    /// The opaque value applications consume.
    pub advertising_token: String,
    /// The credential presented to the refresh endpoint.
    pub refresh_token: String,
    /// After this instant the advertising token must not be returned.
    pub identity_expires: u64,
    /// At or after this instant a background refresh is due.
    pub refresh_from: u64,
    /// After this instant the refresh credential is dead.
    pub refresh_expires: u64,
    /// Base64 key material decrypting the next refresh response.
    pub refresh_response_key: String,
}

impl IdentityEnvelope {
    /// Scale second-resolution timestamps up to milliseconds.
    pub fn normalized(mut self) -> Self {
        self.identity_expires = normalize_epoch_ms(self.identity_expires);
        self.refresh_from = normalize_epoch_ms(self.refresh_from);
        self.refresh_expires = normalize_epoch_ms(self.refresh_expires);
        self
    }

    /// Structural validation applied at every ingress.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint: empty token strings, an empty
    /// response key, or out-of-order timestamps.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.advertising_token.is_empty() {
            return Err(EnvelopeError::EmptyField {
                field: "advertising_token",
            });
        }
        if self.refresh_token.is_empty() {
            return Err(EnvelopeError::EmptyField {
                field: "refresh_token",
            });
        }
        if self.refresh_response_key.is_empty() {
            return Err(EnvelopeError::EmptyField {
                field: "refresh_response_key",
            });
        }
        if self.refresh_from > self.identity_expires
            || self.identity_expires > self.refresh_expires
        {
            return Err(EnvelopeError::TimestampOrder);
        }
        Ok(())
    }

    /// Whether the envelope passes structural validation.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Parse an envelope from a raw (URL-encoded JSON) cookie value.
    ///
    /// The result is normalized but not yet validated; callers classify it.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is not URL-encoded JSON of the
    /// envelope shape.
    pub fn parse_cookie_value(raw: &str) -> Result<Self, EnvelopeError> {
        let json = urlencoding::decode(raw).map_err(|_| EnvelopeError::Encoding)?;
        let envelope: Self = serde_json::from_str(&json)?;
        Ok(envelope.normalized())
    }

    /// Render the envelope as a cookie value (URL-encoded JSON).
    pub fn to_cookie_value(&self) -> String {
        let json = serde_json::to_string(self).expect("envelope serializes");
        urlencoding::encode(&json).into_owned()
    }
}

fn normalize_epoch_ms(value: u64) -> u64 {
    if (SECONDS_MAGNITUDE_FLOOR..MS_MAGNITUDE_THRESHOLD).contains(&value) {
        value * 1_000
    } else {
        value
    }
}
