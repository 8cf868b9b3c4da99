//! Walks the account key hierarchy.
//!
//! Every account's keys form one chain: the master key (derived from
//! email and password, never stored) seals the random user key; the
//! user key seals the account's RSA private key; each org key is
//! sealed under the account's RSA public key, one copy per membership.
//! Unwrapping runs strictly in that order, and each link reports which
//! stage rejected the material.

use crate::directory::Directory;
use crate::error::{CustodyError, CustodyResult, UnwrapStage};
use crate::types::{
    MembershipRecord, NewIdentity, OrgKey, ResolutionPolicy, ResolvedOrgKeys, UserRecord,
};
use keywarden_crypto::{
    derive_master_key, derive_password_hash, derive_stored_verifier, generate_verifier_salt, open,
    open_rsa, parse_private_key_der, seal, MasterKey, RsaKeyPair, RsaPrivateKey, SymmetricKey,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroize;

/// Mints the full credential chain for a new password.
///
/// Derives the verifier, generates a fresh user key and RSA keypair,
/// and seals each link under the one above it. The plaintext keypair
/// rides along so the caller can seal org keys under it.
pub fn new_identity(email: &str, password: &str) -> CustodyResult<NewIdentity> {
    let master = derive_master_key(email, password);
    let password_hash = derive_password_hash(&master, password);
    let verifier_salt = generate_verifier_salt();
    let verifier = derive_stored_verifier(&password_hash, &verifier_salt).to_vec();

    let user_key = SymmetricKey::generate();
    let sealed_user_key = seal(&master.to_symmetric_key(), user_key.as_bytes())?;

    let keypair = RsaKeyPair::generate()?;
    let mut private_der = keypair.private_key_der()?;
    let sealed_private_key = seal(&user_key, &private_der)?;
    private_der.zeroize();

    Ok(NewIdentity {
        verifier,
        verifier_salt,
        user_key: sealed_user_key,
        private_key: sealed_private_key,
        public_key: keypair.public_key_b64()?,
        keypair,
    })
}

/// Opens the sealed user key with a master key.
pub fn unlock_user_key(user: &UserRecord, master: &MasterKey) -> CustodyResult<SymmetricKey> {
    let mut plain = open(&master.to_symmetric_key(), &user.user_key).map_err(|source| {
        CustodyError::Unwrap {
            stage: UnwrapStage::UserKey,
            source,
        }
    })?;
    let key = SymmetricKey::from_bytes(&plain).map_err(|source| CustodyError::Unwrap {
        stage: UnwrapStage::UserKey,
        source,
    });
    plain.zeroize();
    key
}

/// Opens the sealed RSA private key with the user key.
pub fn unlock_private_key(
    user: &UserRecord,
    user_key: &SymmetricKey,
) -> CustodyResult<RsaPrivateKey> {
    let mut der = open(user_key, &user.private_key).map_err(|source| CustodyError::Unwrap {
        stage: UnwrapStage::PrivateKey,
        source,
    })?;
    let key = parse_private_key_der(&der).map_err(|source| CustodyError::Unwrap {
        stage: UnwrapStage::PrivateKey,
        source,
    });
    der.zeroize();
    key
}

/// Opens one membership's sealed org key with the RSA private key.
pub fn open_org_key(
    membership: &MembershipRecord,
    private: &RsaPrivateKey,
) -> CustodyResult<OrgKey> {
    let bytes = open_rsa(&membership.org_key, private).map_err(|source| CustodyError::Unwrap {
        stage: UnwrapStage::OrgKey,
        source,
    })?;
    Ok(OrgKey::new(bytes))
}

/// Walks the whole chain for a single membership.
pub fn resolve_org_key(
    user: &UserRecord,
    membership: &MembershipRecord,
    password: &str,
) -> CustodyResult<OrgKey> {
    let master = derive_master_key(&user.email, password);
    let user_key = unlock_user_key(user, &master)?;
    let private = unlock_private_key(user, &user_key)?;
    open_org_key(membership, &private)
}

/// Recovers org keys for every membership with one pass down the chain.
///
/// The master, user, and private keys are unwrapped once; only the
/// per-membership org key step repeats. Under
/// [`ResolutionPolicy::FailFast`] the first bad membership aborts the
/// whole call. Under [`ResolutionPolicy::Partial`] bad memberships are
/// reported in [`ResolvedOrgKeys::failed`] and the rest still resolve.
pub fn resolve_all_org_keys(
    user: &UserRecord,
    memberships: &[MembershipRecord],
    password: &str,
    policy: ResolutionPolicy,
) -> CustodyResult<ResolvedOrgKeys> {
    let master = derive_master_key(&user.email, password);
    let user_key = unlock_user_key(user, &master)?;
    let private = unlock_private_key(user, &user_key)?;

    let mut keys = HashMap::with_capacity(memberships.len());
    let mut failed = Vec::new();
    for membership in memberships {
        match open_org_key(membership, &private) {
            Ok(key) => {
                keys.insert(membership.org_id, key);
            }
            Err(e) => match policy {
                ResolutionPolicy::FailFast => return Err(e),
                ResolutionPolicy::Partial => {
                    warn!("leaving org {} unresolved for {}: {e}", membership.org_id, user.id);
                    failed.push(membership.org_id);
                }
            },
        }
    }
    Ok(ResolvedOrgKeys { keys, failed })
}

/// Directory-backed facade over the pure chain walkers.
pub struct KeyHierarchy {
    directory: Arc<dyn Directory>,
}

impl KeyHierarchy {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Fetches one account's rows and resolves its org keys.
    ///
    /// The derivation chain runs 600k-round PBKDF2 plus RSA, so the
    /// whole lookup-and-unwrap runs on a blocking thread.
    pub async fn resolve_account(
        &self,
        email: &str,
        password: &str,
        policy: ResolutionPolicy,
    ) -> CustodyResult<ResolvedOrgKeys> {
        let directory = Arc::clone(&self.directory);
        let owned_email = email.to_owned();
        let password = password.to_owned();

        let resolved = tokio::task::spawn_blocking(move || {
            let user = directory
                .get_user(&owned_email)?
                .ok_or_else(|| CustodyError::NotFound(format!("no account for {owned_email}")))?;
            let memberships = directory.list_memberships(user.id)?;
            resolve_all_org_keys(&user, &memberships, &password, policy)
        })
        .await
        .map_err(|e| CustodyError::Internal(format!("resolution task panicked: {e}")))??;

        debug!(
            "resolved {} org keys for {email} ({} unresolved)",
            resolved.keys.len(),
            resolved.failed.len()
        );
        Ok(resolved)
    }
}
