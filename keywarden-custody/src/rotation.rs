//! Account enrollment and credential rotation.
//!
//! Every path here follows the same discipline: gather all key
//! material first, mint the replacement chain, then stage every row
//! write in a single directory transaction. A rotation therefore
//! either commits whole (fresh verifier, keys, and security stamp),
//! aborts before the first write (missing org key, bad old password),
//! or fails at the store and leaves the old rows untouched.
//!
//! A committed rotation always mints a new security stamp, which
//! invalidates every session token issued under the old one.

use crate::directory::Directory;
use crate::error::{CustodyError, CustodyResult};
use crate::hierarchy::{new_identity, resolve_all_org_keys};
use crate::registry::OrgKeyRegistry;
use crate::types::{
    MemberStatus, MembershipRecord, MembershipRotation, OrgKey, Registration, ResolutionPolicy,
    RotationReceipt, UserRecord, UserRotation,
};
use chrono::Utc;
use keywarden_crypto::{seal_rsa, PBKDF_ITERATIONS};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Runs enrollment and rotation against a directory, with an
/// [`OrgKeyRegistry`] supplying org keys for the paths that cannot
/// recover them from a password.
pub struct RotationProtocol {
    directory: Arc<dyn Directory>,
    registry: Arc<dyn OrgKeyRegistry>,
}

impl RotationProtocol {
    pub fn new(directory: Arc<dyn Directory>, registry: Arc<dyn OrgKeyRegistry>) -> Self {
        Self {
            directory,
            registry,
        }
    }

    /// Creates an account with a full credential chain and one
    /// confirmed membership per requested org.
    ///
    /// Aborts before any write if some requested org has no key in the
    /// registry.
    pub async fn register(&self, registration: Registration) -> CustodyResult<UserRecord> {
        let directory = Arc::clone(&self.directory);
        let registry = Arc::clone(&self.registry);
        let email = registration.email.clone();
        let seats = registration.orgs.len();

        let result = tokio::task::spawn_blocking(move || {
            register_rows(directory.as_ref(), registry.as_ref(), registration)
        })
        .await
        .map_err(|e| CustodyError::Internal(format!("registration task panicked: {e}")))?;

        match &result {
            Ok(user) => info!("registered {email} with {seats} org seats (user {})", user.id),
            Err(e) => warn!("registration for {email} did not commit: {e}"),
        }
        result
    }

    /// Admin path: rewraps an account under a new password without the
    /// old one, pulling every org key from the registry.
    pub async fn reset_password(
        &self,
        email: &str,
        new_password: &str,
    ) -> CustodyResult<RotationReceipt> {
        let directory = Arc::clone(&self.directory);
        let registry = Arc::clone(&self.registry);
        let owned_email = email.to_owned();
        let new_password = new_password.to_owned();

        let result = tokio::task::spawn_blocking(move || {
            let user = fetch_user(directory.as_ref(), &owned_email)?;
            let memberships = directory.list_memberships(user.id)?;

            let mut org_keys = Vec::with_capacity(memberships.len());
            for membership in &memberships {
                let key = registry
                    .org_key(membership.org_id)?
                    .ok_or(CustodyError::MissingOrgKey(membership.org_id))?;
                org_keys.push((membership.id, key));
            }
            rotate_rows(directory.as_ref(), &user, &new_password, &org_keys)
        })
        .await
        .map_err(|e| CustodyError::Internal(format!("reset task panicked: {e}")))?;

        log_rotation("password reset", email, &result);
        result
    }

    /// Self-service path: rewraps an account under a new password,
    /// recovering org keys with the old password instead of the
    /// registry.
    pub async fn rotate_credentials(
        &self,
        email: &str,
        old_password: &str,
        new_password: &str,
    ) -> CustodyResult<RotationReceipt> {
        let directory = Arc::clone(&self.directory);
        let owned_email = email.to_owned();
        let old_password = old_password.to_owned();
        let new_password = new_password.to_owned();

        let result = tokio::task::spawn_blocking(move || {
            let user = fetch_user(directory.as_ref(), &owned_email)?;
            let memberships = directory.list_memberships(user.id)?;

            let resolved = resolve_all_org_keys(
                &user,
                &memberships,
                &old_password,
                ResolutionPolicy::FailFast,
            )?;
            let mut org_keys = Vec::with_capacity(memberships.len());
            for membership in &memberships {
                if let Some(key) = resolved.keys.get(&membership.org_id) {
                    org_keys.push((membership.id, key.clone()));
                }
            }
            rotate_rows(directory.as_ref(), &user, &new_password, &org_keys)
        })
        .await
        .map_err(|e| CustodyError::Internal(format!("rotation task panicked: {e}")))?;

        log_rotation("credential rotation", email, &result);
        result
    }
}

fn fetch_user(directory: &dyn Directory, email: &str) -> CustodyResult<UserRecord> {
    directory
        .get_user(email)?
        .ok_or_else(|| CustodyError::NotFound(format!("no account for {email}")))
}

fn log_rotation(path: &str, email: &str, result: &CustodyResult<RotationReceipt>) {
    match result {
        Ok(receipt) => info!(
            "{path} committed for {email}: {} memberships rewrapped, stamp {}",
            receipt.memberships, receipt.security_stamp
        ),
        Err(e) => warn!("{path} for {email} did not commit: {e}"),
    }
}

fn register_rows(
    directory: &dyn Directory,
    registry: &dyn OrgKeyRegistry,
    registration: Registration,
) -> CustodyResult<UserRecord> {
    // Every org key must be in hand before the first row is staged.
    let mut org_keys = Vec::with_capacity(registration.orgs.len());
    for enrollment in &registration.orgs {
        let key = registry
            .org_key(enrollment.org_id)?
            .ok_or(CustodyError::MissingOrgKey(enrollment.org_id))?;
        org_keys.push((*enrollment, key));
    }

    let identity = new_identity(&registration.email, &registration.password)?;
    let user_id = Uuid::new_v4();

    let mut memberships = Vec::with_capacity(org_keys.len());
    for (enrollment, org_key) in &org_keys {
        memberships.push(MembershipRecord {
            id: Uuid::new_v4(),
            user_id,
            org_id: enrollment.org_id,
            org_key: seal_rsa(&identity.keypair.public, org_key.as_bytes())?,
            role: enrollment.role,
            status: MemberStatus::Confirmed,
            access_all: false,
        });
    }

    let now = Utc::now();
    let user = UserRecord {
        id: user_id,
        email: registration.email,
        name: registration.name,
        verifier: identity.verifier,
        verifier_salt: identity.verifier_salt,
        kdf_iterations: PBKDF_ITERATIONS,
        client_kdf_iterations: PBKDF_ITERATIONS,
        user_key: identity.user_key,
        private_key: identity.private_key,
        public_key: identity.public_key,
        security_stamp: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
    };

    let mut txn = directory.begin()?;
    txn.create_user(&user)?;
    for membership in &memberships {
        txn.create_membership(membership)?;
    }
    txn.commit()?;
    Ok(user)
}

/// Mints a replacement chain for `user`, rewraps the given org keys
/// under it, and commits every row in one transaction.
fn rotate_rows(
    directory: &dyn Directory,
    user: &UserRecord,
    new_password: &str,
    org_keys: &[(Uuid, OrgKey)],
) -> CustodyResult<RotationReceipt> {
    let identity = new_identity(&user.email, new_password)?;

    let mut rewrapped = Vec::with_capacity(org_keys.len());
    for (membership_id, org_key) in org_keys {
        rewrapped.push(MembershipRotation {
            membership_id: *membership_id,
            org_key: seal_rsa(&identity.keypair.public, org_key.as_bytes())?,
        });
    }

    let security_stamp = Uuid::new_v4();
    let rotation = UserRotation {
        user_id: user.id,
        verifier: identity.verifier,
        verifier_salt: identity.verifier_salt,
        user_key: identity.user_key,
        private_key: identity.private_key,
        public_key: identity.public_key,
        security_stamp,
        updated_at: Utc::now(),
    };

    let mut txn = directory.begin()?;
    txn.update_user(&rotation)?;
    for membership in &rewrapped {
        txn.update_membership(membership)?;
    }
    txn.commit()?;

    Ok(RotationReceipt {
        user_id: user.id,
        security_stamp,
        memberships: rewrapped.len(),
    })
}
