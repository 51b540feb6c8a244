//! Key directory contract and directory keys.
//!
//! Tokens are sealed under keys addressed by numeric id. The directory is an
//! external collaborator (the operator's key service rotates and distributes
//! keys); the codec only consumes the snapshot interface defined here.
//! [`MemoryKeyStore`] is a complete in-process implementation used by tests
//! and by embedders that manage key material themselves.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::aead::KeySecret;
use crate::{CodecError, Result};

/// A directory key: key material plus addressing and activation metadata.
#[derive(Clone)]
pub struct EncryptionKey {
    id: u32,
    secret: KeySecret,
    activates_at: u64,
    expires_at: u64,
    site_id: Option<u32>,
}

impl EncryptionKey {
    /// Create a service-wide key that is always active.
    pub fn new(id: u32, secret: KeySecret) -> Self {
        Self {
            id,
            secret,
            activates_at: 0,
            expires_at: u64::MAX,
            site_id: None,
        }
    }

    /// Create a site-scoped key with an activation window.
    pub fn for_site(
        id: u32,
        secret: KeySecret,
        site_id: u32,
        activates_at: u64,
        expires_at: u64,
    ) -> Self {
        Self {
            id,
            secret,
            activates_at,
            expires_at,
            site_id: Some(site_id),
        }
    }

    /// The key id embedded into token bytes.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The key material.
    pub fn secret(&self) -> &KeySecret {
        &self.secret
    }

    /// The site this key is scoped to, if any.
    pub fn site_id(&self) -> Option<u32> {
        self.site_id
    }

    /// Whether the key may be used for sealing at the given instant.
    pub fn is_active(&self, now_ms: u64) -> bool {
        self.activates_at <= now_ms && now_ms < self.expires_at
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("id", &self.id)
            .field("site_id", &self.site_id)
            .field("activates_at", &self.activates_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Snapshot interface of the key directory.
pub trait KeyStore: Send + Sync {
    /// The service-wide master key used for the outer encryption layer.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoMasterKey` if the directory holds none.
    fn master_key(&self) -> Result<EncryptionKey>;

    /// The newest site key active for `site_id` at the given instant.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoActiveSiteKey` if no key qualifies.
    fn active_site_key(&self, site_id: u32, now_ms: u64) -> Result<EncryptionKey>;

    /// Look up any key by its embedded id.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::UnknownKey` if the id is not in the directory.
    fn key(&self, id: u32) -> Result<EncryptionKey>;
}

/// In-memory key directory.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    master_id: Option<u32>,
    keys: HashMap<u32, EncryptionKey>,
}

impl MemoryKeyStore {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key and mark it as the master key.
    pub fn add_master_key(&self, key: EncryptionKey) {
        let mut inner = self.inner.write().expect("key store lock poisoned");
        inner.master_id = Some(key.id());
        inner.keys.insert(key.id(), key);
    }

    /// Insert a site key.
    pub fn add_site_key(&self, key: EncryptionKey) {
        let mut inner = self.inner.write().expect("key store lock poisoned");
        inner.keys.insert(key.id(), key);
    }
}

impl KeyStore for MemoryKeyStore {
    fn master_key(&self) -> Result<EncryptionKey> {
        let inner = self.inner.read().expect("key store lock poisoned");
        inner
            .master_id
            .and_then(|id| inner.keys.get(&id).cloned())
            .ok_or(CodecError::NoMasterKey)
    }

    fn active_site_key(&self, site_id: u32, now_ms: u64) -> Result<EncryptionKey> {
        let inner = self.inner.read().expect("key store lock poisoned");
        inner
            .keys
            .values()
            .filter(|k| k.site_id() == Some(site_id) && k.is_active(now_ms))
            .max_by_key(|k| k.activates_at)
            .cloned()
            .ok_or(CodecError::NoActiveSiteKey { site_id })
    }

    fn key(&self, id: u32) -> Result<EncryptionKey> {
        let inner = self.inner.read().expect("key store lock poisoned");
        inner
            .keys
            .get(&id)
            .cloned()
            .ok_or(CodecError::UnknownKey { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(fill: u8) -> KeySecret {
        KeySecret::from([fill; 32])
    }

    fn store_with_keys() -> MemoryKeyStore {
        let store = MemoryKeyStore::new();
        store.add_master_key(EncryptionKey::new(101, secret(0x0A)));
        store.add_site_key(EncryptionKey::for_site(201, secret(0x0B), 7, 1_000, 2_000));
        store.add_site_key(EncryptionKey::for_site(202, secret(0x0C), 7, 1_500, 3_000));
        store
    }

    #[test]
    fn test_master_key_lookup() {
        let store = store_with_keys();
        assert_eq!(store.master_key().unwrap().id(), 101);
    }

    #[test]
    fn test_empty_store_has_no_master() {
        let store = MemoryKeyStore::new();
        assert!(matches!(store.master_key(), Err(CodecError::NoMasterKey)));
    }

    #[test]
    fn test_key_by_id() {
        let store = store_with_keys();
        assert_eq!(store.key(201).unwrap().id(), 201);
        assert!(matches!(
            store.key(999),
            Err(CodecError::UnknownKey { id: 999 })
        ));
    }

    #[test]
    fn test_active_site_key_prefers_newest() {
        let store = store_with_keys();
        // Both keys active: the later activation wins.
        assert_eq!(store.active_site_key(7, 1_800).unwrap().id(), 202);
        // Only the first key is active.
        assert_eq!(store.active_site_key(7, 1_200).unwrap().id(), 201);
    }

    #[test]
    fn test_active_site_key_respects_expiry() {
        let store = store_with_keys();
        // First key expired, second still active.
        assert_eq!(store.active_site_key(7, 2_500).unwrap().id(), 202);
        // Everything expired.
        assert!(matches!(
            store.active_site_key(7, 5_000),
            Err(CodecError::NoActiveSiteKey { site_id: 7 })
        ));
    }

    #[test]
    fn test_active_site_key_wrong_site() {
        let store = store_with_keys();
        assert!(matches!(
            store.active_site_key(8, 1_800),
            Err(CodecError::NoActiveSiteKey { site_id: 8 })
        ));
    }

    #[test]
    fn test_key_debug_omits_secret() {
        let key = EncryptionKey::new(1, secret(0x42));
        let debug = format!("{:?}", key);
        assert!(!debug.contains("secret"));
        assert!(debug.ends_with(".. }"));
    }
}
