//! Pseudonymous id derivation.
//!
//! Two salted-hash steps separate what sites see from what the service
//! stores: the *first-level key* hashes the normalized email hash with a
//! long-lived salt, and the *advertising id* hashes the first-level key
//! with a rotating per-bucket salt. Rotating the bucket salt re-derives
//! every advertising id in the bucket without touching first-level keys.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};

/// Derive the first-level key from an email hash and the first-level salt.
pub fn first_level_key(email_hash: &str, first_level_salt: &str) -> String {
    salted_digest(email_hash, first_level_salt)
}

/// Derive the advertising id from a first-level key and a rotating salt.
pub fn advertising_id(first_level_key: &str, rotating_salt: &str) -> String {
    salted_digest(first_level_key, rotating_salt)
}

fn salted_digest(input: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.update(salt.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// A request to establish an identity for a user on a site.
#[derive(Clone, Debug)]
pub struct IdentityRequest {
    /// Hash of the user's normalized email address.
    pub email_hash: String,
    /// The site establishing the identity.
    pub site_id: u32,
    /// Privacy flag bits supplied by the site.
    pub privacy_bits: u32,
}

/// The derived pseudonymous identity for one user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappedIdentity {
    /// The advertising id embedded into advertising and user tokens.
    pub advertising_id: String,
    /// The salt bucket the id was derived under.
    pub bucket_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let flk1 = first_level_key("email-hash", "salt-a");
        let flk2 = first_level_key("email-hash", "salt-a");
        assert_eq!(flk1, flk2);
    }

    #[test]
    fn test_salt_changes_derivation() {
        assert_ne!(
            first_level_key("email-hash", "salt-a"),
            first_level_key("email-hash", "salt-b")
        );
        let flk = first_level_key("email-hash", "salt-a");
        assert_ne!(
            advertising_id(&flk, "rot-1"),
            advertising_id(&flk, "rot-2")
        );
    }

    #[test]
    fn test_advertising_id_differs_from_first_level_key() {
        let flk = first_level_key("email-hash", "salt-a");
        assert_ne!(advertising_id(&flk, "rot-1"), flk);
    }

    #[test]
    fn test_output_is_base64_of_sha256() {
        let id = first_level_key("x", "y");
        let decoded = BASE64.decode(id).unwrap();
        assert_eq!(decoded.len(), 32);
    }
}
