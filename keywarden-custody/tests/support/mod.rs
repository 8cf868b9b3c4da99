//! Shared test doubles for custody integration tests.

#![allow(dead_code)]

use chrono::Utc;
use keywarden_crypto::{seal_rsa, PBKDF_ITERATIONS};
use keywarden_custody::hierarchy::new_identity;
use keywarden_custody::{
    Directory, DirectoryTxn, MemberRole, MemberStatus, MembershipRecord, MembershipRotation,
    NewIdentity, OrgKey, OrgKeyTable, StoreError, UserRecord, UserRotation,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Full contents of a [`MemoryDirectory`], cloneable for snapshots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DirectoryState {
    pub users: HashMap<Uuid, UserRecord>,
    pub memberships: HashMap<Uuid, MembershipRecord>,
}

/// In-memory [`Directory`] with buffered transactions and optional
/// write-failure injection.
pub struct MemoryDirectory {
    state: Mutex<DirectoryState>,
    writes: AtomicUsize,
    fail_on_write: Option<usize>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::with_state(DirectoryState::default())
    }

    pub fn with_state(state: DirectoryState) -> Self {
        Self {
            state: Mutex::new(state),
            writes: AtomicUsize::new(0),
            fail_on_write: None,
        }
    }

    /// Makes the n-th staged write (1-based) fail with a store error.
    pub fn fail_on_write(mut self, nth: usize) -> Self {
        self.fail_on_write = Some(nth);
        self
    }

    /// Total writes staged so far, committed or not.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> DirectoryState {
        self.state.lock().unwrap().clone()
    }

    fn record_write(&self) -> Result<(), StoreError> {
        let nth = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_write == Some(nth) {
            return Err(StoreError(format!("injected failure on write {nth}")));
        }
        Ok(())
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory for MemoryDirectory {
    fn get_user(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    fn list_memberships(&self, user_id: Uuid) -> Result<Vec<MembershipRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<MembershipRecord> = state
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.id);
        Ok(rows)
    }

    fn begin(&self) -> Result<Box<dyn DirectoryTxn + '_>, StoreError> {
        let staged = self.state.lock().unwrap().clone();
        Ok(Box::new(MemoryTxn {
            directory: self,
            staged,
        }))
    }
}

/// Stages writes against a clone of the state; commit swaps it in,
/// drop throws it away.
struct MemoryTxn<'a> {
    directory: &'a MemoryDirectory,
    staged: DirectoryState,
}

impl DirectoryTxn for MemoryTxn<'_> {
    fn create_user(&mut self, user: &UserRecord) -> Result<(), StoreError> {
        self.directory.record_write()?;
        if self.staged.users.values().any(|u| u.email == user.email) {
            return Err(StoreError(format!("email {} already registered", user.email)));
        }
        self.staged.users.insert(user.id, user.clone());
        Ok(())
    }

    fn update_user(&mut self, rotation: &UserRotation) -> Result<(), StoreError> {
        self.directory.record_write()?;
        self.staged
            .users
            .get_mut(&rotation.user_id)
            .ok_or_else(|| StoreError(format!("no user row {}", rotation.user_id)))?
            .apply_rotation(rotation);
        Ok(())
    }

    fn create_membership(&mut self, membership: &MembershipRecord) -> Result<(), StoreError> {
        self.directory.record_write()?;
        self.staged.memberships.insert(membership.id, membership.clone());
        Ok(())
    }

    fn update_membership(&mut self, rotation: &MembershipRotation) -> Result<(), StoreError> {
        self.directory.record_write()?;
        self.staged
            .memberships
            .get_mut(&rotation.membership_id)
            .ok_or_else(|| StoreError(format!("no membership row {}", rotation.membership_id)))?
            .apply_rotation(rotation);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        *self.directory.state.lock().unwrap() = self.staged;
        Ok(())
    }
}

/// Deterministic 64-byte org key material.
pub fn org_key_bytes(seed: u8) -> Vec<u8> {
    vec![seed; 64]
}

/// Registry preloaded with `(org id, key seed)` pairs.
pub fn registry_with(entries: &[(Uuid, u8)]) -> OrgKeyTable {
    let table = OrgKeyTable::new();
    for (org_id, seed) in entries {
        table.insert(*org_id, OrgKey::new(org_key_bytes(*seed)));
    }
    table
}

/// A stored user row built from freshly minted credentials.
pub fn user_record_from(identity: &NewIdentity, email: &str, name: &str) -> UserRecord {
    let now = Utc::now();
    UserRecord {
        id: Uuid::new_v4(),
        email: email.into(),
        name: name.into(),
        verifier: identity.verifier.clone(),
        verifier_salt: identity.verifier_salt.clone(),
        kdf_iterations: PBKDF_ITERATIONS,
        client_kdf_iterations: PBKDF_ITERATIONS,
        user_key: identity.user_key.clone(),
        private_key: identity.private_key.clone(),
        public_key: identity.public_key.clone(),
        security_stamp: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
    }
}

/// A complete account: user row plus one confirmed membership per
/// `(org id, key seed)` pair, each org key sealed for that account.
pub fn seeded_account(
    email: &str,
    password: &str,
    orgs: &[(Uuid, u8)],
) -> (UserRecord, Vec<MembershipRecord>) {
    let identity = new_identity(email, password).expect("mint identity");
    let user = user_record_from(&identity, email, "Test User");
    let memberships = orgs
        .iter()
        .map(|(org_id, seed)| MembershipRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            org_id: *org_id,
            org_key: seal_rsa(&identity.keypair.public, &org_key_bytes(*seed))
                .expect("seal org key"),
            role: MemberRole::User,
            status: MemberStatus::Confirmed,
            access_all: false,
        })
        .collect();
    (user, memberships)
}

/// Directory state holding one account and its memberships.
pub fn state_with(user: &UserRecord, memberships: &[MembershipRecord]) -> DirectoryState {
    let mut state = DirectoryState::default();
    state.users.insert(user.id, user.clone());
    for membership in memberships {
        state.memberships.insert(membership.id, membership.clone());
    }
    state
}
