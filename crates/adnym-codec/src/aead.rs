//! AES-256-GCM payload framing.
//!
//! Every encrypted segment in the token formats (and the refresh-response
//! envelope) shares one frame: a random 96-bit IV followed by the
//! ciphertext and its authentication tag. IVs come from the OS RNG on
//! every seal, and the 256-bit key bytes live inside a [`KeySecret`] that
//! wipes them on drop - callers hand key material in, nothing reads it
//! back out.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CodecError, Result};

/// Size of a symmetric key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the IV in bytes (96 bits, the AES-GCM standard nonce).
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Key material for one cipher key.
///
/// Holds exactly [`KEY_SIZE`] bytes and wipes them when dropped. The bytes
/// arrive from the key directory or from a decoded response key and are
/// consumed only by [`seal`] and [`open`]; there is no accessor handing
/// them back out.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeySecret {
    bytes: [u8; KEY_SIZE],
}

impl KeySecret {
    /// Wrap key material of unverified length.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::InvalidKeyLength` unless `bytes` is exactly
    /// [`KEY_SIZE`] long, so bad directory entries and truncated response
    /// keys surface here rather than inside the cipher.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes = bytes
            .try_into()
            .map_err(|_| CodecError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes })
    }
}

impl From<[u8; KEY_SIZE]> for KeySecret {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }
}

impl std::fmt::Debug for KeySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySecret").finish_non_exhaustive()
    }
}

/// Encrypt a plaintext segment, returning `IV || ciphertext+tag`.
///
/// # Errors
///
/// Returns `CodecError::Encryption` if the cipher rejects the input.
pub fn seal(key: &KeySecret, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.bytes));

    let mut iv = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CodecError::Encryption)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `IV || ciphertext+tag` segment.
///
/// # Errors
///
/// Returns `CodecError::Decryption` if:
/// - The segment is too short to hold an IV and tag
/// - The ciphertext has been tampered with
/// - The wrong key is used
pub fn open(key: &KeySecret, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CodecError::Decryption);
    }
    let (iv, ciphertext) = payload.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.bytes));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CodecError::Decryption)
}
