//! Property-based tests for the classifier and envelope normalization.
//!
//! These verify the lifecycle invariants hold for arbitrary envelopes and
//! instants:
//!
//! - An established classification always implies a returnable token
//! - A returnable token always implies an established classification
//! - Normalization preserves timestamp ordering and is idempotent

use proptest::prelude::*;

use crate::classify::{classify, token_returnable, IdentityState};
use crate::envelope::IdentityEnvelope;

/// Arbitrary ordered timestamp triple in a realistic epoch range.
fn ordered_timestamps() -> impl Strategy<Value = (u64, u64, u64)> {
    (1_600_000_000_000u64..2_000_000_000_000u64)
        .prop_flat_map(|refresh_from| {
            (
                Just(refresh_from),
                refresh_from..refresh_from + 100_000_000,
            )
        })
        .prop_flat_map(|(refresh_from, identity_expires)| {
            (
                Just(refresh_from),
                Just(identity_expires),
                // Second-granularity producers floor this field; keep at
                // least a full second of headroom above identity_expires.
                identity_expires + 1_000..identity_expires + 100_000_000,
            )
        })
}

fn envelope(refresh_from: u64, identity_expires: u64, refresh_expires: u64) -> IdentityEnvelope {
    IdentityEnvelope {
        advertising_token: "adv".into(),
        refresh_token: "ref".into(),
        identity_expires,
        refresh_from,
        refresh_expires,
        refresh_response_key: "a2V5".into(),
    }
}

proptest! {
    /// Established classification and returnability coincide exactly.
    #[test]
    fn established_iff_returnable(
        (refresh_from, identity_expires, refresh_expires) in ordered_timestamps(),
        now in 1_500_000_000_000u64..2_100_000_000_000u64,
    ) {
        let e = envelope(refresh_from, identity_expires, refresh_expires);
        let state = classify(Some(&e), now);
        let returnable = token_returnable(Some(&e), now);

        prop_assert_eq!(
            matches!(state, IdentityState::Established { .. }),
            returnable
        );
    }

    /// Classification is exhaustive and consistent with the timestamps.
    #[test]
    fn classification_matches_timestamps(
        (refresh_from, identity_expires, refresh_expires) in ordered_timestamps(),
        now in 1_500_000_000_000u64..2_100_000_000_000u64,
    ) {
        let e = envelope(refresh_from, identity_expires, refresh_expires);
        match classify(Some(&e), now) {
            IdentityState::RefreshExpired => prop_assert!(now >= refresh_expires),
            IdentityState::Expired => {
                prop_assert!(now >= identity_expires && now < refresh_expires)
            }
            IdentityState::Established { refresh_due } => {
                prop_assert!(now < identity_expires);
                prop_assert_eq!(refresh_due, now >= refresh_from);
            }
            other => prop_assert!(false, "unexpected state {:?}", other),
        }
    }

    /// Normalization keeps the ordering invariant and is idempotent.
    #[test]
    fn normalization_preserves_order(
        (refresh_from, identity_expires, refresh_expires) in ordered_timestamps(),
        scale_refresh_expires in any::<bool>(),
    ) {
        let mut e = envelope(refresh_from, identity_expires, refresh_expires);
        if scale_refresh_expires {
            // Mimic a second-resolution producer.
            e.refresh_expires /= 1_000;
        }
        let normalized = e.normalized();
        prop_assert!(normalized.refresh_from <= normalized.identity_expires);
        prop_assert!(normalized.identity_expires <= normalized.refresh_expires);
        prop_assert_eq!(normalized.clone().normalized(), normalized);
    }
}
