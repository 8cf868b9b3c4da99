//! Shared types for key custody operations.

use chrono::{DateTime, Utc};
use keywarden_crypto::{Envelope, RsaKeyPair};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An account row as the directory stores it.
///
/// Everything here is safe at rest: the verifier is a salted slow hash,
/// the user key and private key are sealed envelopes, and the public
/// key is public by definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub verifier: Vec<u8>,
    pub verifier_salt: Vec<u8>,
    pub kdf_iterations: u32,
    pub client_kdf_iterations: u32,
    pub user_key: Envelope,
    pub private_key: Envelope,
    pub public_key: String,
    pub security_stamp: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Applies a committed rotation to this row.
    pub fn apply_rotation(&mut self, rotation: &UserRotation) {
        self.verifier = rotation.verifier.clone();
        self.verifier_salt = rotation.verifier_salt.clone();
        self.user_key = rotation.user_key.clone();
        self.private_key = rotation.private_key.clone();
        self.public_key = rotation.public_key.clone();
        self.security_stamp = rotation.security_stamp;
        self.updated_at = rotation.updated_at;
    }
}

/// One user's seat in one org, with the org key sealed for that user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub org_key: Envelope,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub access_all: bool,
}

impl MembershipRecord {
    /// Replaces the sealed org key after a rotation.
    pub fn apply_rotation(&mut self, rotation: &MembershipRotation) {
        self.org_key = rotation.org_key.clone();
    }
}

/// Role of a member within an org.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    User,
    Custom,
}

impl MemberRole {
    /// Numeric level as clients encode it. Lower outranks higher.
    pub fn level(self) -> i32 {
        match self {
            MemberRole::Owner => 0,
            MemberRole::Admin => 1,
            MemberRole::User => 2,
            MemberRole::Custom => 3,
        }
    }
}

/// Lifecycle status of a membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Invited,
    Accepted,
    Confirmed,
}

impl MemberStatus {
    /// Numeric level as clients encode it.
    pub fn level(self) -> i32 {
        match self {
            MemberStatus::Invited => 0,
            MemberStatus::Accepted => 1,
            MemberStatus::Confirmed => 2,
        }
    }
}

/// A plaintext org symmetric key.
///
/// Lives only in memory while sealing or unsealing; wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OrgKey(Vec<u8>);

impl OrgKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Freshly minted credential material for one account.
///
/// Produced by [`new_identity`](crate::hierarchy::new_identity); the
/// caller seals org keys under `keypair` and persists the rest.
pub struct NewIdentity {
    pub verifier: Vec<u8>,
    pub verifier_salt: Vec<u8>,
    pub user_key: Envelope,
    pub private_key: Envelope,
    pub public_key: String,
    pub keypair: RsaKeyPair,
}

/// Replacement credential columns for a user row.
#[derive(Clone, Debug)]
pub struct UserRotation {
    pub user_id: Uuid,
    pub verifier: Vec<u8>,
    pub verifier_salt: Vec<u8>,
    pub user_key: Envelope,
    pub private_key: Envelope,
    pub public_key: String,
    pub security_stamp: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Replacement sealed org key for a membership row.
#[derive(Clone, Debug)]
pub struct MembershipRotation {
    pub membership_id: Uuid,
    pub org_key: Envelope,
}

/// What a committed rotation changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationReceipt {
    pub user_id: Uuid,
    pub security_stamp: Uuid,
    pub memberships: usize,
}

/// A new account request.
#[derive(Clone, Debug)]
pub struct Registration {
    pub email: String,
    pub name: String,
    pub password: String,
    pub orgs: Vec<OrgEnrollment>,
}

/// An org seat to create during registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrgEnrollment {
    pub org_id: Uuid,
    pub role: MemberRole,
}

/// How org key resolution treats memberships that fail to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Stop at the first failure.
    #[default]
    FailFast,
    /// Collect what opens, report the org ids that did not.
    Partial,
}

/// Org keys recovered by walking a user's memberships.
pub struct ResolvedOrgKeys {
    pub keys: HashMap<Uuid, OrgKey>,
    pub failed: Vec<Uuid>,
}

impl ResolvedOrgKeys {
    /// True when every membership yielded its key.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
