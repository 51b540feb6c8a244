//! # adnym-operator
//!
//! Server-side counterpart of the adnym client: derives pseudonymous
//! advertising ids from salted hashes, mints the advertising/user/refresh
//! token triple through the shared codec, answers refresh calls against an
//! opt-out contract, and seals the encrypted refresh-response envelope the
//! client decrypts.
//!
//! The salt directory and the opt-out store are external services; this
//! crate defines the contracts it needs from them ([`SaltProvider`],
//! [`OptOutStore`]) and ships in-memory implementations for tests and
//! single-process deployments.

#![deny(unsafe_code)]

pub mod error;
pub mod identity;
pub mod optout;
pub mod response;
pub mod salt;
pub mod service;

pub use error::{OperatorError, Result};
pub use identity::{advertising_id, first_level_key, IdentityRequest, MappedIdentity};
pub use optout::{MemoryOptOutStore, OptOutStore};
pub use response::{
    generate_response_key, seal_refresh_response, RefreshEnvelope, RefreshStatus,
};
pub use salt::{MemorySaltProvider, SaltEntry, SaltProvider};
pub use service::{IdentityBundle, OperatorConfig, OperatorService, RefreshResult};
