//! Refresh endpoint response handling.
//!
//! Successful responses are base64(IV || AES-256-GCM ciphertext) keyed by
//! the envelope's `refresh_response_key`; the plaintext is UTF-8 JSON of
//! `{"status": ..., "body": ...}`. Error statuses may arrive as plaintext
//! JSON on non-2xx responses. Anything unreadable normalizes to the error
//! outcome - internal decode failures never surface to the host as
//! distinct error kinds.

use adnym_codec::aead::{self, KeySecret};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::envelope::IdentityEnvelope;

/// Path of the refresh endpoint under the base URL.
pub const REFRESH_PATH: &str = "/v2/token/refresh";

/// Header naming the client build on every refresh call.
pub const CLIENT_VERSION_HEADER: &str = "X-UID2-Client-Version";

/// Value sent under [`CLIENT_VERSION_HEADER`].
pub const CLIENT_VERSION: &str = concat!("adnym-client-", env!("CARGO_PKG_VERSION"));

/// Errors from the response decryption step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    /// The body was not valid base64.
    #[error("response body is not valid base64")]
    Base64,

    /// The response key was not valid base64 of 32 bytes.
    #[error("refresh response key is not usable")]
    Key,

    /// The payload could not be authenticated/decrypted.
    #[error("response payload failed to decrypt")]
    Decryption,
}

/// The identity-level outcome of one refresh call.
#[derive(Clone, Debug, PartialEq)]
pub enum RefreshOutcome {
    /// A new envelope was issued.
    Refreshed(IdentityEnvelope),
    /// The user opted out; terminal.
    OptOut,
    /// The refresh credential is dead; terminal until a fresh login.
    ExpiredToken,
    /// Transient failure; the retry policy applies.
    Error,
}

#[derive(Deserialize)]
struct WireResponse {
    status: String,
    body: Option<IdentityEnvelope>,
}

/// Decrypt a refresh response body into its JSON plaintext.
///
/// # Errors
///
/// Returns a [`ResponseError`] naming the first failing step.
pub fn decrypt_refresh_response(
    body: &[u8],
    response_key_b64: &str,
) -> Result<Vec<u8>, ResponseError> {
    let text = std::str::from_utf8(body).map_err(|_| ResponseError::Base64)?;
    let sealed = BASE64
        .decode(text.trim())
        .map_err(|_| ResponseError::Base64)?;

    let key_bytes = BASE64
        .decode(response_key_b64)
        .map_err(|_| ResponseError::Key)?;
    let key = KeySecret::from_bytes(&key_bytes).map_err(|_| ResponseError::Key)?;

    aead::open(&key, &sealed).map_err(|_| ResponseError::Decryption)
}

/// Interpret a raw refresh response as an identity-level outcome.
///
/// 2xx bodies are decrypted with the response key; non-2xx bodies are tried
/// as plaintext JSON carrying a recognized status. Everything else is the
/// error outcome.
pub fn interpret_refresh_response(
    status: u16,
    body: &[u8],
    response_key_b64: &str,
) -> RefreshOutcome {
    let wire: WireResponse = if (200..300).contains(&status) {
        match decrypt_refresh_response(body, response_key_b64) {
            Ok(plaintext) => match serde_json::from_slice(&plaintext) {
                Ok(wire) => wire,
                Err(err) => {
                    warn!(%err, "refresh response plaintext is not valid JSON");
                    return RefreshOutcome::Error;
                }
            },
            Err(err) => {
                warn!(%err, "refresh response could not be decrypted");
                return RefreshOutcome::Error;
            }
        }
    } else {
        match serde_json::from_slice(body) {
            Ok(wire) => wire,
            Err(_) => {
                warn!(status, "refresh call failed without a recognized status body");
                return RefreshOutcome::Error;
            }
        }
    };

    match wire.status.as_str() {
        "success" => match wire.body {
            Some(envelope) => {
                let envelope = envelope.normalized();
                if envelope.is_valid() {
                    RefreshOutcome::Refreshed(envelope)
                } else {
                    warn!("refresh response envelope failed validation");
                    RefreshOutcome::Error
                }
            }
            None => RefreshOutcome::Error,
        },
        "optout" => RefreshOutcome::OptOut,
        // invalid_token is treated as expired_token pending a firmer server
        // contract.
        "expired_token" | "invalid_token" => RefreshOutcome::ExpiredToken,
        _ => RefreshOutcome::Error,
    }
}
