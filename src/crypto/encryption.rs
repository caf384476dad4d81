//! AES-256-GCM encryption/decryption for backup artifacts
//!
//! Every encryption generates a fresh 96-bit IV. The IV travels with the
//! backup record (base64), never inside the key material. GCM authenticates
//! the ciphertext, so a wrong key or a flipped byte fails decryption instead
//! of producing garbage.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use super::DerivedKey;
use crate::error::{VaultError, VaultResult};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const IV_SIZE: usize = 12;

/// Supported symmetric ciphers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionAlgorithm::Aes256Gcm => write!(f, "aes-256-gcm"),
        }
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aes-256-gcm" | "aes256gcm" => Ok(EncryptionAlgorithm::Aes256Gcm),
            other => Err(VaultError::Config(format!(
                "Unsupported encryption algorithm: {}",
                other
            ))),
        }
    }
}

/// Encrypt plaintext with AES-256-GCM under a fresh random IV
///
/// Returns `(ciphertext, iv)`; the ciphertext includes the authentication tag.
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> VaultResult<(Vec<u8>, [u8; IV_SIZE])> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok((ciphertext, iv))
}

/// Decrypt AES-256-GCM ciphertext produced by [`encrypt`]
///
/// Fails with an integrity error when the IV is malformed or authentication
/// fails (wrong key or tampered data).
pub fn decrypt(ciphertext: &[u8], iv: &[u8], key: &DerivedKey) -> VaultResult<Vec<u8>> {
    if iv.len() != IV_SIZE {
        return Err(VaultError::Integrity(format!(
            "Invalid IV size: expected {}, got {}",
            IV_SIZE,
            iv.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Encryption(format!("Failed to create cipher: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| {
            VaultError::Integrity("Decryption failed: invalid key or corrupted data".to_string())
        })
}

/// Encode an IV for storage in a metadata record
pub fn encode_iv(iv: &[u8]) -> String {
    STANDARD.encode(iv)
}

/// Decode an IV from a metadata record
pub fn decode_iv(encoded: &str) -> VaultResult<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| VaultError::Integrity(format!("Invalid IV encoding: {}", e)))
}

/// Process-wide backup cipher
///
/// Holds the derived key, if one was configured. The key is shared read-only
/// between components; nothing can replace it after construction.
#[derive(Clone, Default)]
pub struct BackupCipher {
    key: Option<Arc<DerivedKey>>,
    algorithm: EncryptionAlgorithm,
}

impl BackupCipher {
    /// Cipher with a key
    pub fn new(key: DerivedKey) -> Self {
        Self {
            key: Some(Arc::new(key)),
            algorithm: EncryptionAlgorithm::Aes256Gcm,
        }
    }

    /// Cipher without a key; encrypt and decrypt fail with a configuration error
    pub fn without_key() -> Self {
        Self::default()
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    fn key(&self) -> VaultResult<&DerivedKey> {
        self.key.as_deref().ok_or_else(|| {
            VaultError::Config(
                "Encryption is enabled but no encryption secret is configured (set CVAULT_ENCRYPTION_KEY)"
                    .into(),
            )
        })
    }

    /// Encrypt with a fresh IV, returning `(ciphertext, base64 iv)`
    pub fn encrypt(&self, plaintext: &[u8]) -> VaultResult<(Vec<u8>, String)> {
        let (ciphertext, iv) = encrypt(plaintext, self.key()?)?;
        Ok((ciphertext, encode_iv(&iv)))
    }

    /// Decrypt with a base64 IV taken from a metadata record
    pub fn decrypt(&self, ciphertext: &[u8], iv: &str) -> VaultResult<Vec<u8>> {
        let key = self.key()?;
        let iv = decode_iv(iv)?;
        decrypt(ciphertext, &iv, key)
    }
}

impl fmt::Debug for BackupCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupCipher")
            .field("has_key", &self.has_key())
            .field("algorithm", &self.algorithm)
            .finish()
    }
}
