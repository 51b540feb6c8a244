//! # adnym-client
//!
//! Client-side identity lifecycle manager for the adnym advertising-identity
//! service.
//!
//! A first party integrates this crate, supplies an initial identity
//! envelope obtained from a server, and thereafter retrieves a short-lived
//! *advertising token* for use in bid requests. The client keeps the
//! identity alive by refreshing it against the remote endpoint before it
//! expires, mirrors it into a cookie so it survives navigation, and exposes
//! an asynchronous accessor that resolves once the identity's status is
//! definitively known.
//!
//! ## Architecture
//!
//! - [`classify`]: pure classification of an envelope against a point in
//!   time; no I/O
//! - [`IdentityClient`]: the lifecycle manager owning the current envelope,
//!   the refresh timer, the waiter queue, and the cookie mirror
//! - [`Clock`], [`Transport`], [`CookieJar`]: injected collaborator
//!   contracts; the host wires real implementations, tests wire fakes
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use adnym_client::{IdentityClient, InitOptions, MemoryCookieJar, SystemClock};
//!
//! let client = IdentityClient::new(
//!     Arc::new(SystemClock),
//!     Arc::new(MyTransport::new()),
//!     Arc::new(MemoryCookieJar::new()),
//! );
//! client.init(
//!     InitOptions::new(Arc::new(|payload| println!("{:?}", payload.status)))
//!         .with_identity(envelope),
//! )?;
//!
//! let token = client.advertising_token_async().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod clock;
pub mod config;
pub mod cookie;
pub mod envelope;
pub mod error;
pub mod manager;
pub mod response;
pub mod status;
pub mod transport;

#[cfg(test)]
mod proptests;

pub use classify::{classify, token_returnable, IdentityState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, InitOptions, DEFAULT_BASE_URL, DEFAULT_REFRESH_RETRY_PERIOD_MS};
pub use cookie::{CookieDirective, CookieError, CookieJar, MemoryCookieJar, IDENTITY_COOKIE_NAME};
pub use envelope::{EnvelopeError, IdentityEnvelope};
pub use error::{ClientError, TokenError};
pub use manager::{IdentityClient, TokenRequest};
pub use response::{
    decrypt_refresh_response, interpret_refresh_response, RefreshOutcome, ResponseError,
    CLIENT_VERSION, CLIENT_VERSION_HEADER, REFRESH_PATH,
};
pub use status::{IdentityStatus, StatusCallback, StatusPayload};
pub use transport::{HttpRequest, HttpResponse, Transport, TransportError};
