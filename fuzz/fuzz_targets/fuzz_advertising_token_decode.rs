//! Fuzz target for advertising token decoding.
//!
//! Both encryption layers must reject arbitrary input gracefully.

#![no_main]

use std::sync::{Arc, OnceLock};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use libfuzzer_sys::fuzz_target;

use adnym_codec::{EncryptionKey, KeySecret, MemoryKeyStore, TokenCodec};

const NOW: u64 = 1_710_000_000_000;

fn codec() -> &'static TokenCodec {
    static CODEC: OnceLock<TokenCodec> = OnceLock::new();
    CODEC.get_or_init(|| {
        let keys = MemoryKeyStore::new();
        keys.add_master_key(EncryptionKey::new(1, KeySecret::from_bytes(&[1u8; 32]).unwrap()));
        keys.add_site_key(EncryptionKey::for_site(
            2,
            KeySecret::from_bytes(&[2u8; 32]).unwrap(),
            7,
            0,
            u64::MAX,
        ));
        TokenCodec::new(Arc::new(keys))
    })
}

fuzz_target!(|data: &[u8]| {
    let _ = codec().decode_advertising_token(&BASE64.encode(data), NOW);

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = codec().decode_advertising_token(text, NOW);
    }
});
