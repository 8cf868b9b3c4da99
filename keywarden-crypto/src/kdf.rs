//! Password-derivation ladder.
//!
//! Three PBKDF2-HMAC-SHA256 stages, matching the vault server's client KDF:
//! the master key (salted with the account email), the one-round transport
//! hash a client presents on login, and the full-strength stored verifier
//! the server keeps. Round counts on both ends come from the single
//! [`PBKDF_ITERATIONS`] constant so client and server can never drift.

use crate::keys::MasterKey;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

/// PBKDF2 round count shared by master-key derivation and verifier
/// hardening.
pub const PBKDF_ITERATIONS: u32 = 600_000;

/// Byte length of the random salt under a stored verifier.
pub const VERIFIER_SALT_LEN: usize = 64;

/// Derives the 32-byte master key from an account's email and password.
///
/// The email is used verbatim as salt; callers pass the canonical
/// (registered) form.
pub fn derive_master_key(email: &str, password: &str) -> MasterKey {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        email.as_bytes(),
        PBKDF_ITERATIONS,
        &mut out,
    );
    MasterKey::from_bytes(out)
}

/// Derives the base64 transport credential a client presents on login.
///
/// One round with the password as salt. Never persisted; the server only
/// ever stores its hardened form.
pub fn derive_password_hash(master_key: &MasterKey, password: &str) -> String {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(master_key.as_bytes(), password.as_bytes(), 1, &mut out);
    STANDARD.encode(out)
}

/// Hardens a transport credential into the stored verifier.
///
/// Full-strength PBKDF2 over the base64 string's bytes. The salt is drawn
/// fresh on every rotation, so identical passwords never produce the same
/// verifier twice.
pub fn derive_stored_verifier(password_hash: &str, salt: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password_hash.as_bytes(), salt, PBKDF_ITERATIONS, &mut out);
    out
}

/// Mints a fresh verifier salt.
pub fn generate_verifier_salt() -> Vec<u8> {
    let mut salt = vec![0u8; VERIFIER_SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}
