//! Envelope encryption for uploaded segments.
//!
//! ## How It Works
//!
//! Each segment gets a fresh AES-256 data key and a random AAD. The data
//! key is wrapped under a configured RSA public key and stored in the
//! segment manifest; chunks are sealed with AES-GCM using the data key,
//! a per-chunk random nonce, and the segment AAD. The stored layout of an
//! encrypted chunk is `nonce || ciphertext || tag`.
//!
//! - **RsaKeyRing**: the key pair, an immutable capability shared by the
//!   write path, the manifest reader, and the chunk manager
//! - **DataKeyAndAad**: one freshly generated key + AAD per segment,
//!   never rotated
//! - **SegmentCipher**: AES-256-GCM bound to one segment's key and AAD
//!
//! ## Usage
//!
//! ```ignore
//! use tierhouse_core::security::{DataKeyAndAad, RsaKeyRing, SegmentCipher};
//!
//! let keyring = RsaKeyRing::from_pem_files(&public_pem, &private_pem)?;
//!
//! // write path: seal chunks, persist the wrapped key in the manifest
//! let data_key = DataKeyAndAad::generate();
//! let cipher = SegmentCipher::new(&data_key.key, &data_key.aad)?;
//! let sealed = cipher.encrypt_chunk(&plaintext)?;
//! let wrapped = keyring.wrap_data_key(&data_key.key)?;
//!
//! // read path: unwrap the manifest's key, open the chunk
//! let unwrapped = keyring.unwrap_data_key(&wrapped)?;
//! let cipher = SegmentCipher::new(&unwrapped, &data_key.aad)?;
//! let plaintext = cipher.decrypt_chunk(&sealed)?;
//! ```

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

pub const DATA_KEY_SIZE: usize = 32;
pub const AAD_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Fixed per-chunk growth introduced by the encryption stage.
pub const ENCRYPTION_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// The RSA key pair that wraps and unwraps per-segment data keys.
pub struct RsaKeyRing {
    public: RsaPublicKey,
    private: RsaPrivateKey,
}

impl RsaKeyRing {
    /// Loads both halves from PEM files. PKCS#8 and PKCS#1 encodings are
    /// accepted.
    pub fn from_pem_files(public_key_file: &Path, private_key_file: &Path) -> Result<Self> {
        let public_pem = std::fs::read_to_string(public_key_file)?;
        let public = RsaPublicKey::from_public_key_pem(&public_pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(&public_pem))
            .map_err(|e| {
                Error::InvalidKey(format!("{}: {e}", public_key_file.display()))
            })?;
        let private_pem = Zeroizing::new(std::fs::read_to_string(private_key_file)?);
        let private = RsaPrivateKey::from_pkcs8_pem(&private_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&private_pem))
            .map_err(|e| {
                Error::InvalidKey(format!("{}: {e}", private_key_file.display()))
            })?;
        Ok(Self { public, private })
    }

    pub fn from_keys(public: RsaPublicKey, private: RsaPrivateKey) -> Self {
        Self { public, private }
    }

    /// Wraps a data key under the public key.
    pub fn wrap_data_key(&self, data_key: &[u8]) -> Result<Vec<u8>> {
        self.public
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), data_key)
            .map_err(|e| Error::KeyWrap(e.to_string()))
    }

    /// Unwraps a data key with the private key. Fails when the key pair
    /// does not match or the wrapped bytes were tampered with.
    pub fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map(Zeroizing::new)
            .map_err(|e| Error::KeyUnwrap(e.to_string()))
    }
}

/// A freshly generated data key plus the AAD bound to its segment.
pub struct DataKeyAndAad {
    pub key: Zeroizing<Vec<u8>>,
    pub aad: Vec<u8>,
}

impl DataKeyAndAad {
    pub fn generate() -> Self {
        let mut key = Zeroizing::new(vec![0u8; DATA_KEY_SIZE]);
        OsRng.fill_bytes(&mut key);
        let mut aad = vec![0u8; AAD_SIZE];
        OsRng.fill_bytes(&mut aad);
        Self { key, aad }
    }
}

/// AES-256-GCM bound to one segment's data key and AAD.
pub struct SegmentCipher {
    cipher: Aes256Gcm,
    aad: Vec<u8>,
}

impl SegmentCipher {
    pub fn new(data_key: &[u8], aad: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(data_key).map_err(|_| {
            Error::InvalidKey(format!(
                "data key must be {DATA_KEY_SIZE} bytes, got {}",
                data_key.len()
            ))
        })?;
        Ok(Self {
            cipher,
            aad: aad.to_vec(),
        })
    }

    /// Seals one chunk as `nonce || ciphertext || tag`. The nonce is drawn
    /// from a secure random source per chunk, so it is unique within the
    /// segment.
    pub fn encrypt_chunk(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: &self.aad,
                },
            )
            .map_err(|e| Error::Encryption(e.to_string()))?;
        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Opens `nonce || ciphertext || tag`, verifying the tag and the AAD
    /// binding. Any tampering surfaces as [`Error::AuthTagInvalid`].
    pub fn decrypt_chunk(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < ENCRYPTION_OVERHEAD {
            return Err(Error::AuthTagInvalid);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: &self.aad,
                },
            )
            .map_err(|_| Error::AuthTagInvalid)
    }
}
