//! Property-based tests for the token codec.
//!
//! Round-trip and rejection laws over arbitrary identities:
//!
//! - Refresh tokens decode back to exactly what was encoded
//! - Advertising tokens preserve everything except the re-stamped
//!   creation instant
//! - Corrupting any sealed byte of an encoded token yields an error,
//!   never a token

use std::sync::{Arc, OnceLock};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use proptest::prelude::*;

use crate::aead::KeySecret;
use crate::codec::TokenCodec;
use crate::keys::{EncryptionKey, MemoryKeyStore};
use crate::tokens::{AdvertisingToken, RefreshToken, UserIdentity};

const SITE: u32 = 7;
const NOW: u64 = 1_710_000_000_000;

/// Refresh-token header bytes before the sealed identity payload:
/// version, three timestamps, key id.
const REFRESH_HEADER_LEN: usize = 1 + 8 + 8 + 8 + 4;

fn codec() -> &'static TokenCodec {
    static CODEC: OnceLock<TokenCodec> = OnceLock::new();
    CODEC.get_or_init(|| {
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
    })
}

fn identities() -> impl Strategy<Value = UserIdentity> {
    (".{0,48}", any::<u32>(), any::<u64>()).prop_map(|(id, privacy_bits, established_at)| {
        UserIdentity {
            id,
            site_id: SITE,
            privacy_bits,
            established_at,
        }
    })
}

proptest! {
    /// Refresh tokens carry every field through the codec unchanged.
    #[test]
    fn refresh_token_roundtrips(
        identity in identities(),
        created_at in any::<u64>(),
        expires_at in any::<u64>(),
        valid_till in any::<u64>(),
    ) {
        let token = RefreshToken::new(created_at, expires_at, valid_till, identity);
        let encoded = codec().encode_refresh_token(&token).unwrap();
        prop_assert_eq!(codec().decode_refresh_token(&encoded).unwrap(), token);
    }

    /// Advertising tokens re-stamp only the creation instant on decode.
    #[test]
    fn advertising_token_restamps_only_creation(
        identity in identities(),
        expires_at in any::<u64>(),
    ) {
        let token = AdvertisingToken::new(NOW, expires_at, identity);
        let encoded = codec().encode_advertising_token(&token, NOW).unwrap();
        let decoded = codec().decode_advertising_token(&encoded, NOW + 5_000).unwrap();

        prop_assert_eq!(decoded.created_at, NOW + 5_000);
        prop_assert_eq!(decoded.version, token.version);
        prop_assert_eq!(decoded.expires_at, token.expires_at);
        prop_assert_eq!(decoded.identity, token.identity);
    }

    /// Any bit flip inside the sealed region fails authentication.
    #[test]
    fn corrupted_sealed_bytes_never_decode(
        identity in identities(),
        flip_index in any::<prop::sample::Index>(),
        flip_mask in 1u8..,
    ) {
        let token = RefreshToken::new(NOW, NOW + 1_000, NOW + 2_000, identity);
        let encoded = codec().encode_refresh_token(&token).unwrap();

        let mut bytes = BASE64.decode(encoded).unwrap();
        let sealed_len = bytes.len() - REFRESH_HEADER_LEN;
        let index = REFRESH_HEADER_LEN + flip_index.index(sealed_len);
        bytes[index] ^= flip_mask;

        prop_assert!(codec().decode_refresh_token(&BASE64.encode(bytes)).is_err());
    }
}
