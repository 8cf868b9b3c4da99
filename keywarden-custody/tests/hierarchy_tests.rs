mod support;

use keywarden_crypto::{derive_master_key, seal_rsa, CryptoError};
use keywarden_custody::hierarchy::{
    new_identity, open_org_key, resolve_all_org_keys, resolve_org_key, unlock_private_key,
    unlock_user_key, KeyHierarchy,
};
use keywarden_custody::{CustodyError, ResolutionPolicy, UnwrapStage};
use std::sync::Arc;
use support::*;
use uuid::Uuid;

const EMAIL: &str = "kim@example.com";
const PASSWORD: &str = "correct horse battery staple";

// ── Chain Walking ──

#[test]
fn resolves_the_org_key_minted_for_the_account() {
    let org = Uuid::new_v4();
    let (user, memberships) = seeded_account(EMAIL, PASSWORD, &[(org, 7)]);

    let key = resolve_org_key(&user, &memberships[0], PASSWORD).unwrap();
    assert_eq!(key.as_bytes(), org_key_bytes(7).as_slice());
}

#[test]
fn chain_unlocks_one_stage_at_a_time() {
    let org = Uuid::new_v4();
    let (user, memberships) = seeded_account(EMAIL, PASSWORD, &[(org, 9)]);

    let master = derive_master_key(&user.email, PASSWORD);
    let user_key = unlock_user_key(&user, &master).unwrap();
    let private = unlock_private_key(&user, &user_key).unwrap();
    let key = open_org_key(&memberships[0], &private).unwrap();
    assert_eq!(key.as_bytes(), org_key_bytes(9).as_slice());
}

// ── Failure Stages ──

#[test]
fn wrong_password_fails_at_the_user_key_stage() {
    let org = Uuid::new_v4();
    let (user, memberships) = seeded_account(EMAIL, PASSWORD, &[(org, 7)]);

    let err = resolve_org_key(&user, &memberships[0], "not the password").unwrap_err();
    match &err {
        CustodyError::Unwrap {
            stage: UnwrapStage::UserKey,
            source: CryptoError::Integrity,
        } => {}
        other => panic!("expected user key integrity failure, got {other}"),
    }
    assert_eq!(err.public_message(), "invalid credentials");
}

#[test]
fn master_key_for_another_email_fails_at_the_user_key_stage() {
    let (user, _) = seeded_account(EMAIL, PASSWORD, &[]);

    let master = derive_master_key("other@example.com", PASSWORD);
    assert!(matches!(
        unlock_user_key(&user, &master),
        Err(CustodyError::Unwrap {
            stage: UnwrapStage::UserKey,
            ..
        })
    ));
}

#[test]
fn membership_sealed_for_someone_else_fails_at_the_org_key_stage() {
    let org = Uuid::new_v4();
    let (user, _) = seeded_account(EMAIL, PASSWORD, &[]);
    let (_, foreign) = seeded_account("rival@example.com", PASSWORD, &[(org, 4)]);

    let err = resolve_org_key(&user, &foreign[0], PASSWORD).unwrap_err();
    match err {
        CustodyError::Unwrap {
            stage: UnwrapStage::OrgKey,
            source: CryptoError::Decrypt(_),
        } => {}
        other => panic!("expected org key stage failure, got {other}"),
    }
}

// ── Whole-Account Resolution ──

#[test]
fn fail_fast_stops_on_the_first_bad_membership() {
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();
    let (user, mut memberships) = seeded_account(EMAIL, PASSWORD, &[(org_a, 1), (org_b, 2)]);

    // Reseal the first org key for a stranger's keypair.
    let stranger = new_identity("stranger@example.com", "another password").unwrap();
    memberships[0].org_key = seal_rsa(&stranger.keypair.public, &org_key_bytes(1)).unwrap();

    let err = resolve_all_org_keys(&user, &memberships, PASSWORD, ResolutionPolicy::FailFast)
        .unwrap_err();
    assert!(matches!(
        err,
        CustodyError::Unwrap {
            stage: UnwrapStage::OrgKey,
            ..
        }
    ));
}

#[test]
fn partial_policy_collects_good_keys_and_failed_orgs() {
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();
    let (user, mut memberships) = seeded_account(EMAIL, PASSWORD, &[(org_a, 1), (org_b, 2)]);

    let stranger = new_identity("stranger@example.com", "another password").unwrap();
    memberships[0].org_key = seal_rsa(&stranger.keypair.public, &org_key_bytes(1)).unwrap();

    let resolved =
        resolve_all_org_keys(&user, &memberships, PASSWORD, ResolutionPolicy::Partial).unwrap();
    assert!(!resolved.is_complete());
    assert_eq!(resolved.failed, vec![org_a]);
    assert_eq!(resolved.keys.len(), 1);
    assert_eq!(resolved.keys[&org_b].as_bytes(), org_key_bytes(2).as_slice());
}

#[test]
fn account_without_orgs_resolves_to_an_empty_set() {
    let (user, memberships) = seeded_account(EMAIL, PASSWORD, &[]);

    let resolved =
        resolve_all_org_keys(&user, &memberships, PASSWORD, ResolutionPolicy::FailFast).unwrap();
    assert!(resolved.is_complete());
    assert!(resolved.keys.is_empty());
}

// ── Directory-Backed Facade ──

#[tokio::test]
async fn resolve_account_walks_the_directory() {
    let org = Uuid::new_v4();
    let (user, memberships) = seeded_account(EMAIL, PASSWORD, &[(org, 5)]);
    let directory = Arc::new(MemoryDirectory::with_state(state_with(&user, &memberships)));

    let hierarchy = KeyHierarchy::new(directory);
    let resolved = hierarchy
        .resolve_account(EMAIL, PASSWORD, ResolutionPolicy::FailFast)
        .await
        .unwrap();
    assert!(resolved.is_complete());
    assert_eq!(resolved.keys[&org].as_bytes(), org_key_bytes(5).as_slice());
}

#[tokio::test]
async fn resolve_account_for_an_unknown_email_is_not_found() {
    let hierarchy = KeyHierarchy::new(Arc::new(MemoryDirectory::new()));

    let err = hierarchy
        .resolve_account("ghost@example.com", "whatever", ResolutionPolicy::FailFast)
        .await
        .unwrap_err();
    assert!(matches!(err, CustodyError::NotFound(_)));
    assert_eq!(err.public_message(), "not found");
}
