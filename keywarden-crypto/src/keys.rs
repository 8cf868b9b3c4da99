//! Key material for the account wrapping chain.

use crate::error::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Bit size of generated RSA keypairs (fixed by the wire protocol).
pub const RSA_KEY_BITS: usize = 2048;

/// Master key derived from an account's email and password.
///
/// Never persisted; it exists only long enough to wrap or unwrap the
/// account's user key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The master key in its envelope-key form (32-byte, HKDF-stretched).
    pub fn to_symmetric_key(&self) -> SymmetricKey {
        SymmetricKey::Derivable(self.0)
    }
}

/// Symmetric envelope key.
///
/// The variant records how the encryption and MAC halves are obtained: a
/// 32-byte key is stretched with HKDF-Expand (infos `"enc"` and `"mac"`),
/// a 64-byte key is split in place. Both produce envelopes the vault
/// server's clients accept.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub enum SymmetricKey {
    /// 32-byte key, stretched into enc/mac halves via HKDF-Expand.
    Derivable([u8; 32]),
    /// 64-byte key: bytes 0..32 encrypt, bytes 32..64 authenticate.
    Split([u8; 64]),
}

impl SymmetricKey {
    /// Mints a random 64-byte split key (user and org keys are 64 bytes).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 64];
        OsRng.fill_bytes(&mut bytes);
        Self::Split(bytes)
    }

    /// Accepts exactly 32 or 64 bytes of key material.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        match bytes.len() {
            32 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(bytes);
                Ok(Self::Derivable(key))
            }
            64 => {
                let mut key = [0u8; 64];
                key.copy_from_slice(bytes);
                Ok(Self::Split(key))
            }
            n => Err(CryptoError::KeyMaterial(format!(
                "symmetric key must be 32 or 64 bytes, got {n}"
            ))),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Derivable(key) => key,
            Self::Split(key) => key,
        }
    }

    /// Returns the (encryption, mac) halves for envelope operations.
    pub(crate) fn enc_mac_keys(&self) -> CryptoResult<([u8; 32], [u8; 32])> {
        match self {
            Self::Derivable(key) => {
                let hkdf = Hkdf::<Sha256>::from_prk(key)
                    .map_err(|e| CryptoError::KeyMaterial(format!("key stretch failed: {e}")))?;
                let mut enc = [0u8; 32];
                let mut mac = [0u8; 32];
                hkdf.expand(b"enc", &mut enc)
                    .map_err(|e| CryptoError::KeyMaterial(format!("key stretch failed: {e}")))?;
                hkdf.expand(b"mac", &mut mac)
                    .map_err(|e| CryptoError::KeyMaterial(format!("key stretch failed: {e}")))?;
                Ok((enc, mac))
            }
            Self::Split(key) => {
                let mut enc = [0u8; 32];
                let mut mac = [0u8; 32];
                enc.copy_from_slice(&key[..32]);
                mac.copy_from_slice(&key[32..]);
                Ok((enc, mac))
            }
        }
    }
}

/// RSA-2048 keypair backing a member's org-key wrapping chain.
///
/// The private key never leaves this process unencrypted: it is PKCS#8
/// encoded and sealed inside a symmetric envelope before persistence. The
/// public key is stored in the clear as base64 SPKI, the form the vault
/// server serves verbatim to other clients.
pub struct RsaKeyPair {
    pub private: RsaPrivateKey,
    pub public: RsaPublicKey,
}

impl RsaKeyPair {
    /// Generates a fresh 2048-bit pair.
    pub fn generate() -> CryptoResult<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyMaterial(format!("RSA key generation failed: {e}")))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// PKCS#8 DER encoding of the private key.
    pub fn private_key_der(&self) -> CryptoResult<Vec<u8>> {
        let der = self
            .private
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyMaterial(format!("PKCS#8 encoding failed: {e}")))?;
        Ok(der.as_bytes().to_vec())
    }

    /// Base64 of the SPKI DER encoding of the public key.
    pub fn public_key_b64(&self) -> CryptoResult<String> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyMaterial(format!("SPKI encoding failed: {e}")))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }
}

/// Parses a PKCS#8 DER private key (the payload of an opened private-key
/// envelope).
pub fn parse_private_key_der(der: &[u8]) -> CryptoResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_der(der)
        .map_err(|e| CryptoError::KeyMaterial(format!("invalid PKCS#8 private key: {e}")))
}

/// Parses a base64 SPKI public key as stored by the vault server.
pub fn parse_public_key_b64(b64: &str) -> CryptoResult<RsaPublicKey> {
    let der = STANDARD
        .decode(b64)
        .map_err(|e| CryptoError::KeyMaterial(format!("invalid public key base64: {e}")))?;
    RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| CryptoError::KeyMaterial(format!("invalid SPKI public key: {e}")))
}
