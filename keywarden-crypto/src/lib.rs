//! Cryptography for the keywarden custody core.
//!
//! Implements the vault server's client-side cryptography: PBKDF2 key
//! derivation, AES-256-CBC + HMAC-SHA256 symmetric envelopes, and RSA-2048
//! OAEP asymmetric envelopes, byte-compatible with the cipher strings the
//! server and its official clients exchange.
//!
//! # Architecture
//!
//! Account keys form a wrapping chain:
//!
//! 1. **Master key**: derived from email + password with PBKDF2-HMAC-SHA256
//!    at 600k rounds. Never stored; re-derived on every unlock.
//! 2. **User key**: a random 64-byte key sealed under the master key. All
//!    of the account's own material hangs off this key.
//! 3. **RSA keypair**: the PKCS#8 private key is sealed under the user key;
//!    the public key is stored in the clear as base64 SPKI.
//! 4. **Org keys**: each organization's shared key is sealed per member
//!    under that member's public key.
//!
//! Rotating a password therefore re-wraps the chain without touching any
//! vault ciphertext, and removing a member only invalidates that member's
//! copy of the org key.

pub mod envelope;
mod error;
pub mod kdf;
pub mod keys;

pub use envelope::{open, open_rsa, seal, seal_rsa, Envelope};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{
    derive_master_key, derive_password_hash, derive_stored_verifier, generate_verifier_salt,
    PBKDF_ITERATIONS, VERIFIER_SALT_LEN,
};
pub use keys::{
    parse_private_key_der, parse_public_key_b64, MasterKey, RsaKeyPair, SymmetricKey, RSA_KEY_BITS,
};

pub use rsa::{RsaPrivateKey, RsaPublicKey};
