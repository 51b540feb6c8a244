//! Fuzz target for identity cookie parsing.
//!
//! A hostile page can write anything into the cookie slot; parsing must
//! reject bad values without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;

use adnym_client::IdentityEnvelope;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        if let Ok(envelope) = IdentityEnvelope::parse_cookie_value(raw) {
            // A parsed envelope must survive the write path unchanged.
            let rewritten = envelope.to_cookie_value();
            let reparsed = IdentityEnvelope::parse_cookie_value(&rewritten)
                .expect("rewritten cookie value parses");
            assert_eq!(reparsed, envelope);
        }
    }
});
