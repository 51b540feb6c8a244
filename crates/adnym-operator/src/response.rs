//! Refresh-response envelope building.
//!
//! The refresh endpoint answers with base64(IV || AES-256-GCM ciphertext)
//! under the per-envelope response key the operator minted on the previous
//! call. The plaintext is UTF-8 JSON of `{"status": ..., "body": ...}`.
//! This is the byte-for-byte mirror of the client's decrypt path.

use adnym_codec::aead::{self, KeySecret, KEY_SIZE};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{OperatorError, Result};

/// The identity envelope handed to clients: the shape persisted in the
/// identity cookie and returned in the `body` of a successful refresh.
///
/// All timestamps are milliseconds since the Unix epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshEnvelope {
    /// The advertising token applications consume.
    pub advertising_token: String,
    /// The credential for the next refresh call.
    pub refresh_token: String,
    /// When the advertising token stops being servable.
    pub identity_expires: u64,
    /// When a background refresh becomes due.
    pub refresh_from: u64,
    /// When the refresh credential dies.
    pub refresh_expires: u64,
    /// Base64 key decrypting the next refresh response.
    pub refresh_response_key: String,
}

/// Wire statuses of the refresh endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    /// A new envelope was issued; `body` is present.
    Success,
    /// The user opted out.
    Optout,
    /// The refresh credential is dead.
    ExpiredToken,
    /// The presented credential could not be decoded.
    InvalidToken,
    /// Transient server failure.
    Error,
}

#[derive(Serialize)]
struct WireBody<'a> {
    status: RefreshStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a RefreshEnvelope>,
}

/// Mint a fresh base64 response key (32 random bytes).
pub fn generate_response_key() -> String {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

/// Seal a refresh response under the caller's response key.
///
/// Returns the base64 body the endpoint writes on 2xx responses.
///
/// # Errors
///
/// Returns `OperatorError::Response` when the key is unusable or sealing
/// fails.
pub fn seal_refresh_response(
    status: RefreshStatus,
    body: Option<&RefreshEnvelope>,
    response_key_b64: &str,
) -> Result<String> {
    let key_bytes = BASE64
        .decode(response_key_b64)
        .map_err(|_| OperatorError::Response("response key is not valid base64".into()))?;
    let key = KeySecret::from_bytes(&key_bytes)
        .map_err(|_| OperatorError::Response("response key has the wrong length".into()))?;

    let json = serde_json::to_vec(&WireBody { status, body })
        .map_err(|err| OperatorError::Response(format!("response body serialization: {err}")))?;
    let sealed = aead::seal(&key, &json)
        .map_err(|_| OperatorError::Response("response encryption failed".into()))?;
    Ok(BASE64.encode(sealed))
}
