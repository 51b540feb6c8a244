//! # adnym-codec
//!
//! Encrypted token codec for the adnym advertising-identity service.
//!
//! This crate provides the byte-exact token formats shared between the
//! client SDK and the server-side operator:
//!
//! - **AdvertisingToken**: the short-lived opaque value applications attach
//!   to bid requests
//! - **UserToken**: the site-scoped identity blob handed to first parties
//! - **RefreshToken**: the credential presented to the refresh endpoint
//!
//! ## Layered encryption
//!
//! Tokens carry two encryption layers: a service-wide *master key* wraps the
//! outer payload, and a per-site *site key* wraps the user identity inside
//! it. The layering lets site keys rotate without invalidating envelopes
//! sealed under the master key, so the two layers are never collapsed.
//!
//! Every encrypted segment is framed as `IV (12 bytes) || ciphertext+tag`
//! (AES-256-GCM), and every encoded token is base64-wrapped at the
//! outermost boundary.
//!
//! ## Key directory
//!
//! The codec is stateless except for a reference to a [`KeyStore`]. Key ids
//! are embedded in the token bytes; decoding fetches the key by id and fails
//! with [`CodecError::UnknownKey`] when the directory does not know it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod aead;
pub mod codec;
pub mod error;
pub mod keys;
pub mod tokens;

#[cfg(test)]
mod proptests;

pub use aead::{open, seal, KeySecret, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use codec::TokenCodec;
pub use error::{CodecError, Result};
pub use keys::{EncryptionKey, KeyStore, MemoryKeyStore};
pub use tokens::{AdvertisingToken, RefreshToken, UserIdentity, UserToken, TOKEN_VERSION};
