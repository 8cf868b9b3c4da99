//! Thread-safe registry of plaintext org symmetric keys.
//!
//! Rotation paths that cannot recover a user's org keys from the old
//! password (registration, admin password reset) read them from this
//! registry instead. Deployments populate it at startup from
//! hex-encoded config entries, one per org the server custodies.

use crate::error::{CustodyResult, StoreError};
use crate::types::OrgKey;
use keywarden_crypto::CryptoError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Source of plaintext org keys for rotation paths.
pub trait OrgKeyRegistry: Send + Sync {
    /// The key for one org. `Ok(None)` when the org is not custodied here.
    fn org_key(&self, org_id: Uuid) -> Result<Option<OrgKey>, StoreError>;
}

/// In-memory [`OrgKeyRegistry`] backed by a locked map.
#[derive(Clone)]
pub struct OrgKeyTable {
    keys: Arc<RwLock<HashMap<Uuid, OrgKey>>>,
}

impl OrgKeyTable {
    pub fn new() -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Builds a table from `(org id, hex key)` config entries.
    pub fn from_hex_entries<I, S>(entries: I) -> CustodyResult<Self>
    where
        I: IntoIterator<Item = (Uuid, S)>,
        S: AsRef<str>,
    {
        let table = Self::new();
        for (org_id, hex_key) in entries {
            table.insert_hex(org_id, hex_key.as_ref())?;
        }
        Ok(table)
    }

    /// Registers one org key from its hex encoding.
    pub fn insert_hex(&self, org_id: Uuid, hex_key: &str) -> CustodyResult<()> {
        let bytes = hex::decode(hex_key.trim()).map_err(|e| {
            CryptoError::KeyMaterial(format!("org {org_id} key is not valid hex: {e}"))
        })?;
        if bytes.len() != 32 && bytes.len() != 64 {
            return Err(CryptoError::KeyMaterial(format!(
                "org {org_id} key must be 32 or 64 bytes, got {}",
                bytes.len()
            ))
            .into());
        }
        self.insert(org_id, OrgKey::new(bytes));
        Ok(())
    }

    /// Registers an already-decoded org key.
    pub fn insert(&self, org_id: Uuid, key: OrgKey) {
        self.keys.write().unwrap().insert(org_id, key);
    }

    /// Removes an org's key (e.g. after offboarding).
    pub fn remove(&self, org_id: Uuid) -> Option<OrgKey> {
        self.keys.write().unwrap().remove(&org_id)
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().unwrap().is_empty()
    }
}

impl Default for OrgKeyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OrgKeyRegistry for OrgKeyTable {
    fn org_key(&self, org_id: Uuid) -> Result<Option<OrgKey>, StoreError> {
        Ok(self.keys.read().unwrap().get(&org_id).cloned())
    }
}
