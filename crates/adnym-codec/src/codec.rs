//! Byte-exact token encoding and decoding.
//!
//! All multi-byte integers are big-endian with no padding between fields.
//!
//! ```text
//! AdvertisingToken: version:1 | masterKeyId:4 |
//!     seal_master( expiresAt:8 | siteKeyId:4 | seal_site( identity ) )
//!
//! RefreshToken:     version:1 | createdAt:8 | expiresAt:8 | validTill:8 |
//!     masterKeyId:4 | seal_master( identity )
//!
//! UserToken:        version:1 | siteKeyId:4 | seal_site( identity )
//!
//! identity:         siteId:4 | idLen:4 | idBytes:idLen |
//!                   privacyBits:4 | establishedAt:8
//! ```
//!
//! Every encoded token is base64-wrapped at the outermost boundary. Only the
//! current [`TOKEN_VERSION`] is accepted; other versions are rejected.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::aead;
use crate::keys::KeyStore;
use crate::tokens::{AdvertisingToken, RefreshToken, UserIdentity, UserToken, TOKEN_VERSION};
use crate::{CodecError, Result};

/// Encoder/decoder for the three token shapes.
///
/// Stateless except for the key directory reference; safe to share.
#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<dyn KeyStore>,
}

impl TokenCodec {
    /// Create a codec over the given key directory.
    pub fn new(keys: Arc<dyn KeyStore>) -> Self {
        Self { keys }
    }

    /// Encode an advertising token.
    ///
    /// `now_ms` selects the active site key for the inner layer.
    pub fn encode_advertising_token(&self, token: &AdvertisingToken, now_ms: u64) -> Result<String> {
        let master = self.keys.master_key()?;
        let site_key = self
            .keys
            .active_site_key(token.identity.site_id, now_ms)?;

        let mut inner = Vec::new();
        inner.extend_from_slice(&token.expires_at.to_be_bytes());
        inner.extend_from_slice(&site_key.id().to_be_bytes());
        inner.extend_from_slice(&aead::seal(
            site_key.secret(),
            &encode_identity(&token.identity),
        )?);

        let mut bytes = Vec::new();
        bytes.push(token.version);
        bytes.extend_from_slice(&master.id().to_be_bytes());
        bytes.extend_from_slice(&aead::seal(master.secret(), &inner)?);

        Ok(BASE64.encode(bytes))
    }

    /// Decode an advertising token.
    ///
    /// The decoded `created_at` is re-stamped with `now_ms`; the encoded
    /// bytes do not carry it.
    pub fn decode_advertising_token(&self, token: &str, now_ms: u64) -> Result<AdvertisingToken> {
        let bytes = BASE64.decode(token).map_err(|_| CodecError::Base64)?;
        let mut outer = Reader::new(&bytes);

        let version = outer.read_u8()?;
        if version != TOKEN_VERSION {
            return Err(CodecError::Malformed("unsupported token version"));
        }
        let master_key_id = outer.read_u32()?;
        let master = self.keys.key(master_key_id)?;

        let inner_bytes = aead::open(master.secret(), outer.rest())?;
        let mut inner = Reader::new(&inner_bytes);

        let expires_at = inner.read_u64()?;
        let site_key_id = inner.read_u32()?;
        let site_key = self.keys.key(site_key_id)?;

        let identity_bytes = aead::open(site_key.secret(), inner.rest())?;
        let identity = decode_identity(&identity_bytes)?;

        Ok(AdvertisingToken {
            version,
            created_at: now_ms,
            expires_at,
            identity,
        })
    }

    /// Encode a user token.
    ///
    /// `now_ms` selects the active site key. The token-level timestamps and
    /// secondary privacy bits are not part of the encoded bytes.
    pub fn encode_user_token(&self, token: &UserToken, now_ms: u64) -> Result<String> {
        let site_key = self
            .keys
            .active_site_key(token.identity.site_id, now_ms)?;

        let mut bytes = Vec::new();
        bytes.push(token.version);
        bytes.extend_from_slice(&site_key.id().to_be_bytes());
        bytes.extend_from_slice(&aead::seal(
            site_key.secret(),
            &encode_identity(&token.identity),
        )?);

        Ok(BASE64.encode(bytes))
    }

    /// Encode a refresh token.
    pub fn encode_refresh_token(&self, token: &RefreshToken) -> Result<String> {
        let master = self.keys.master_key()?;

        let mut bytes = Vec::new();
        bytes.push(token.version);
        bytes.extend_from_slice(&token.created_at.to_be_bytes());
        bytes.extend_from_slice(&token.expires_at.to_be_bytes());
        bytes.extend_from_slice(&token.valid_till.to_be_bytes());
        bytes.extend_from_slice(&master.id().to_be_bytes());
        bytes.extend_from_slice(&aead::seal(master.secret(), &encode_identity(&token.identity))?);

        Ok(BASE64.encode(bytes))
    }

    /// Decode a refresh token.
    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshToken> {
        let bytes = BASE64.decode(token).map_err(|_| CodecError::Base64)?;
        let mut reader = Reader::new(&bytes);

        let version = reader.read_u8()?;
        if version != TOKEN_VERSION {
            return Err(CodecError::Malformed("unsupported token version"));
        }
        let created_at = reader.read_u64()?;
        let expires_at = reader.read_u64()?;
        let valid_till = reader.read_u64()?;
        let key_id = reader.read_u32()?;
        let key = self.keys.key(key_id)?;

        let identity_bytes = aead::open(key.secret(), reader.rest())?;
        let identity = decode_identity(&identity_bytes)?;

        Ok(RefreshToken {
            version,
            created_at,
            expires_at,
            valid_till,
            identity,
        })
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

fn encode_identity(identity: &UserIdentity) -> Vec<u8> {
    let id_bytes = identity.id.as_bytes();
    let mut out = Vec::with_capacity(20 + id_bytes.len());
    out.extend_from_slice(&identity.site_id.to_be_bytes());
    out.extend_from_slice(&(id_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(id_bytes);
    out.extend_from_slice(&identity.privacy_bits.to_be_bytes());
    out.extend_from_slice(&identity.established_at.to_be_bytes());
    out
}

fn decode_identity(bytes: &[u8]) -> Result<UserIdentity> {
    let mut reader = Reader::new(bytes);

    let site_id = reader.read_u32()?;
    let id_len = reader.read_u32()? as usize;
    let id_bytes = reader.take(id_len)?;
    let id = std::str::from_utf8(id_bytes)
        .map_err(|_| CodecError::Malformed("identity id is not UTF-8"))?
        .to_string();
    let privacy_bits = reader.read_u32()?;
    let established_at = reader.read_u64()?;

    if !reader.is_empty() {
        return Err(CodecError::Malformed("trailing bytes after identity"));
    }

    Ok(UserIdentity {
        id,
        site_id,
        privacy_bits,
        established_at,
    })
}

/// Checked big-endian reader over a byte slice. Truncated input surfaces as
/// `CodecError::Malformed` instead of a panic.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(CodecError::Malformed("truncated token"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("4-byte slice")))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("8-byte slice")))
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aead::KeySecret;
    use crate::keys::{EncryptionKey, MemoryKeyStore};

    const NOW: u64 = 1_710_000_000_000;
    const SITE: u32 = 7;

    fn codec() -> TokenCodec {
        let store = MemoryKeyStore::new();
        store.add_master_key(EncryptionKey::new(11, KeySecret::from([0x4D; 32])));
        store.add_site_key(EncryptionKey::for_site(
            21,
            KeySecret::from([0x53; 32]),
            SITE,
            0,
            u64::MAX,
        ));
        TokenCodec::new(Arc::new(store))
    }

    fn identity() -> UserIdentity {
        UserIdentity::new("pseudonymous-id-value", SITE, 1, NOW - 86_400_000)
    }

    #[test]
    fn test_advertising_token_roundtrip() {
        let codec = codec();
        let token = AdvertisingToken::new(NOW, NOW + 14_400_000, identity());

        let encoded = codec.encode_advertising_token(&token, NOW).unwrap();
        let decoded = codec
            .decode_advertising_token(&encoded, NOW + 1_000)
            .unwrap();

        assert_eq!(decoded.version, token.version);
        assert_eq!(decoded.expires_at, token.expires_at);
        assert_eq!(decoded.identity, token.identity);
        // created_at is re-stamped on decode.
        assert_eq!(decoded.created_at, NOW + 1_000);
    }

    #[test]
    fn test_refresh_token_roundtrip() {
        let codec = codec();
        let token = RefreshToken::new(NOW, NOW + 14_400_000, NOW + 2_592_000_000, identity());

        let encoded = codec.encode_refresh_token(&token).unwrap();
        let decoded = codec.decode_refresh_token(&encoded).unwrap();

        assert_eq!(decoded, token);
    }

    #[test]
    fn test_user_token_encodes() {
        let codec = codec();
        let token = UserToken::new(NOW, NOW + 14_400_000, identity(), 2);

        let encoded = codec.encode_user_token(&token, NOW).unwrap();
        let bytes = BASE64.decode(encoded).unwrap();

        assert_eq!(bytes[0], TOKEN_VERSION);
        assert_eq!(u32::from_be_bytes(bytes[1..5].try_into().unwrap()), 21);
    }

    #[test]
    fn test_decode_rejects_unknown_master_key() {
        let codec = codec();
        let token = RefreshToken::new(NOW, NOW + 1, NOW + 2, identity());
        let encoded = codec.encode_refresh_token(&token).unwrap();

        let other = TokenCodec::new(Arc::new(MemoryKeyStore::new()));
        assert!(matches!(
            other.decode_refresh_token(&encoded),
            Err(CodecError::UnknownKey { id: 11 })
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_version() {
        let codec = codec();
        let token = RefreshToken::new(NOW, NOW + 1, NOW + 2, identity());
        let encoded = codec.encode_refresh_token(&token).unwrap();

        let mut bytes = BASE64.decode(encoded).unwrap();
        bytes[0] = TOKEN_VERSION + 1;
        let result = codec.decode_refresh_token(&BASE64.encode(bytes));

        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let codec = codec();
        assert!(matches!(
            codec.decode_refresh_token("not!!valid@@base64"),
            Err(CodecError::Base64)
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_token() {
        let codec = codec();
        let token = RefreshToken::new(NOW, NOW + 1, NOW + 2, identity());
        let encoded = codec.encode_refresh_token(&token).unwrap();

        let mut bytes = BASE64.decode(encoded).unwrap();
        bytes.truncate(20);
        let result = codec.decode_refresh_token(&BASE64.encode(bytes));

        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_tampered_payload() {
        let codec = codec();
        let token = AdvertisingToken::new(NOW, NOW + 1, identity());
        let encoded = codec.encode_advertising_token(&token, NOW).unwrap();

        let mut bytes = BASE64.decode(encoded).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let result = codec.decode_advertising_token(&BASE64.encode(bytes), NOW);

        assert!(matches!(result, Err(CodecError::Decryption)));
    }

    #[test]
    fn test_identity_with_empty_id_roundtrips() {
        let codec = codec();
        let token = RefreshToken::new(
            NOW,
            NOW + 1,
            NOW + 2,
            UserIdentity::new("", SITE, 0, NOW),
        );
        let encoded = codec.encode_refresh_token(&token).unwrap();
        assert_eq!(codec.decode_refresh_token(&encoded).unwrap(), token);
    }

    #[test]
    fn test_identity_decode_rejects_oversized_length_prefix() {
        // A length prefix larger than the remaining payload must not panic.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SITE.to_be_bytes());
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        bytes.extend_from_slice(b"short");
        assert!(matches!(
            decode_identity(&bytes),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_encode_requires_active_site_key() {
        let store = MemoryKeyStore::new();
        store.add_master_key(EncryptionKey::new(11, KeySecret::from([0x4D; 32])));
        store.add_site_key(EncryptionKey::for_site(
            21,
            KeySecret::from([0x53; 32]),
            SITE,
            NOW + 1_000,
            u64::MAX,
        ));
        let codec = TokenCodec::new(Arc::new(store));

        let token = AdvertisingToken::new(NOW, NOW + 1, identity());
        assert!(matches!(
            codec.encode_advertising_token(&token, NOW),
            Err(CodecError::NoActiveSiteKey { site_id: SITE })
        ));
    }
}
