//! Fuzz target for refresh token decoding.
//!
//! Arbitrary input must produce a decode error or a token, never a panic.

#![no_main]

use std::sync::{Arc, OnceLock};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use libfuzzer_sys::fuzz_target;

use adnym_codec::{EncryptionKey, KeySecret, MemoryKeyStore, TokenCodec};

fn codec() -> &'static TokenCodec {
    static CODEC: OnceLock<TokenCodec> = OnceLock::new();
    CODEC.get_or_init(|| {
        let keys = MemoryKeyStore::new();
        keys.add_master_key(EncryptionKey::new(1, KeySecret::from_bytes(&[1u8; 32]).unwrap()));
        TokenCodec::new(Arc::new(keys))
    })
}

fuzz_target!(|data: &[u8]| {
    // Raw bytes through the base64 boundary exercise the frame reader.
    let _ = codec().decode_refresh_token(&BASE64.encode(data));

    // Arbitrary strings exercise the base64 rejection path too.
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = codec().decode_refresh_token(text);
    }
});
