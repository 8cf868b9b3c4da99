//! Wire-format envelopes for the vault server.
//!
//! Two envelope kinds, tagged by a leading type marker on the wire:
//!
//! - `2.`: AES-256-CBC with PKCS#7 padding, authenticated by HMAC-SHA256
//!   over IV then ciphertext, encoded `2.<b64 iv>|<b64 ciphertext>|<b64 mac>`.
//! - `4.`: RSA-2048 OAEP (SHA-1), encoded `4.<b64 ciphertext>`.
//!
//! Every secret this core writes to a vault row travels in one of these
//! envelopes, and the server's official clients must be able to open them,
//! so the encoding has to stay byte-compatible. Base64 is the standard
//! alphabet with padding.

use crate::error::{CryptoError, CryptoResult};
use crate::keys::SymmetricKey;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha1::Sha1;
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// A parsed wire envelope.
///
/// `Display` and `FromStr` carry the exact wire form; rows store the
/// string, this type is what the crypto operates on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Envelope {
    /// AES-256-CBC ciphertext with an HMAC-SHA256 tag over IV and ciphertext.
    AesCbcHmac {
        iv: [u8; 16],
        ciphertext: Vec<u8>,
        mac: [u8; 32],
    },
    /// RSA-2048 OAEP(SHA-1) ciphertext.
    RsaOaep { ciphertext: Vec<u8> },
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Envelope::AesCbcHmac {
                iv,
                ciphertext,
                mac,
            } => write!(
                f,
                "2.{}|{}|{}",
                STANDARD.encode(iv),
                STANDARD.encode(ciphertext),
                STANDARD.encode(mac)
            ),
            Envelope::RsaOaep { ciphertext } => write!(f, "4.{}", STANDARD.encode(ciphertext)),
        }
    }
}

impl FromStr for Envelope {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(body) = s.strip_prefix("2.") {
            let mut fields = body.split('|');
            let (Some(iv_b64), Some(ct_b64), Some(mac_b64)) =
                (fields.next(), fields.next(), fields.next())
            else {
                return Err(CryptoError::Format(
                    "symmetric envelope needs iv|ciphertext|mac".into(),
                ));
            };
            if fields.next().is_some() {
                return Err(CryptoError::Format(
                    "symmetric envelope has trailing fields".into(),
                ));
            }
            if iv_b64.is_empty() || ct_b64.is_empty() || mac_b64.is_empty() {
                return Err(CryptoError::Format(
                    "symmetric envelope has an empty field".into(),
                ));
            }

            let iv_bytes = decode_b64(iv_b64, "iv")?;
            let ciphertext = decode_b64(ct_b64, "ciphertext")?;
            let mac_bytes = decode_b64(mac_b64, "mac")?;

            let iv: [u8; 16] = iv_bytes
                .try_into()
                .map_err(|_| CryptoError::Format("iv must be 16 bytes".into()))?;
            let mac: [u8; 32] = mac_bytes
                .try_into()
                .map_err(|_| CryptoError::Format("mac must be 32 bytes".into()))?;

            Ok(Envelope::AesCbcHmac {
                iv,
                ciphertext,
                mac,
            })
        } else if let Some(body) = s.strip_prefix("4.") {
            if body.is_empty() {
                return Err(CryptoError::Format(
                    "asymmetric envelope has no ciphertext".into(),
                ));
            }
            let ciphertext = decode_b64(body, "ciphertext")?;
            Ok(Envelope::RsaOaep { ciphertext })
        } else {
            Err(CryptoError::Format(format!(
                "unknown envelope type in {:?}",
                s.chars().take(8).collect::<String>()
            )))
        }
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

fn decode_b64(field: &str, what: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(field)
        .map_err(|e| CryptoError::Format(format!("{what} is not valid base64: {e}")))
}

/// Seals plaintext under a symmetric key.
///
/// A fresh random IV is drawn per call, so sealing the same plaintext
/// twice yields different envelopes.
pub fn seal(key: &SymmetricKey, plaintext: &[u8]) -> CryptoResult<Envelope> {
    let (enc_key, mac_key) = key.enc_mac_keys()?;

    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut iv);

    let ciphertext =
        Aes256CbcEnc::new(&enc_key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let mac = authenticate(&mac_key, &iv, &ciphertext)?;

    Ok(Envelope::AesCbcHmac {
        iv,
        ciphertext,
        mac,
    })
}

/// Opens a symmetric envelope.
///
/// The MAC is verified in constant time before anything is decrypted; a
/// mismatch reports [`CryptoError::Integrity`] without running the cipher.
/// Decryption then rejects corrupt PKCS#7 padding (a zero pad byte, a pad
/// longer than a block, inconsistent pad bytes, or a ciphertext that is
/// not a whole number of blocks) with [`CryptoError::Padding`].
pub fn open(key: &SymmetricKey, envelope: &Envelope) -> CryptoResult<Vec<u8>> {
    let Envelope::AesCbcHmac {
        iv,
        ciphertext,
        mac,
    } = envelope
    else {
        return Err(CryptoError::Format(
            "expected a symmetric (type 2) envelope".into(),
        ));
    };

    let (enc_key, mac_key) = key.enc_mac_keys()?;

    let expected = authenticate(&mac_key, iv, ciphertext)?;
    if !bool::from(expected.as_slice().ct_eq(mac.as_slice())) {
        return Err(CryptoError::Integrity);
    }

    Aes256CbcDec::new(&enc_key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Padding)
}

/// Seals plaintext for a recipient's RSA public key (OAEP, SHA-1).
///
/// Used to wrap a plaintext org key for one member; only that member's
/// private key can open the result.
pub fn seal_rsa(public_key: &RsaPublicKey, plaintext: &[u8]) -> CryptoResult<Envelope> {
    let ciphertext = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), plaintext)
        .map_err(|e| CryptoError::Encrypt(format!("RSA seal failed: {e}")))?;
    Ok(Envelope::RsaOaep { ciphertext })
}

/// Opens an asymmetric envelope with the recipient's private key.
pub fn open_rsa(envelope: &Envelope, private_key: &RsaPrivateKey) -> CryptoResult<Vec<u8>> {
    let Envelope::RsaOaep { ciphertext } = envelope else {
        return Err(CryptoError::Format(
            "expected an asymmetric (type 4) envelope".into(),
        ));
    };

    private_key
        .decrypt(Oaep::new::<Sha1>(), ciphertext)
        .map_err(|_| CryptoError::Decrypt("RSA open failed (wrong key or tampered data)".into()))
}

fn authenticate(mac_key: &[u8; 32], iv: &[u8], ciphertext: &[u8]) -> CryptoResult<[u8; 32]> {
    let mut hmac = HmacSha256::new_from_slice(mac_key)
        .map_err(|e| CryptoError::KeyMaterial(format!("mac key rejected: {e}")))?;
    hmac.update(iv);
    hmac.update(ciphertext);
    Ok(hmac.finalize().into_bytes().into())
}
