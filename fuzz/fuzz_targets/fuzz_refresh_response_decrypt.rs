//! Fuzz target for refresh response interpretation.
//!
//! Whatever the transport hands back must normalize to an outcome, never a
//! panic - including non-2xx plaintext bodies.

#![no_main]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use libfuzzer_sys::fuzz_target;

use adnym_client::{decrypt_refresh_response, interpret_refresh_response};

fuzz_target!(|data: &[u8]| {
    let key = BASE64.encode([7u8; 32]);

    let _ = decrypt_refresh_response(data, &key);
    let _ = interpret_refresh_response(200, data, &key);
    let _ = interpret_refresh_response(400, data, &key);

    // An unusable key must fail cleanly as well.
    let _ = interpret_refresh_response(200, data, "not-base64-key");
});
