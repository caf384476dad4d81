//! Key derivation using Argon2id
//!
//! The backup encryption secret is an operator-supplied passphrase. The
//! 256-bit AES key is derived from it with Argon2id using the salt and cost
//! parameters stored in the settings file, so every process configured with
//! the same secret derives the same key.

use std::fmt;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, Params,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{VaultError, VaultResult};

/// Parameters for key derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDerivationParams {
    /// Salt for key derivation (base64 encoded)
    pub salt: String,
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism degree (default: 4)
    pub parallelism: u32,
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            salt: String::new(), // Will be generated on first use
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KeyDerivationParams {
    /// Create new params with a random salt
    pub fn new() -> Self {
        let salt = SaltString::generate(&mut OsRng);
        Self {
            salt: salt.to_string(),
            ..Default::default()
        }
    }

    /// Create params with a random salt and explicit costs
    pub fn with_costs(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            memory_cost,
            time_cost,
            parallelism,
            ..Self::new()
        }
    }
}

/// A derived 256-bit encryption key, zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; 32],
}

impl DerivedKey {
    /// Wrap raw key bytes
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive an encryption key from a passphrase
pub fn derive_key(passphrase: &str, params: &KeyDerivationParams) -> VaultResult<DerivedKey> {
    if passphrase.is_empty() {
        return Err(VaultError::Config("Encryption secret is empty".into()));
    }

    let salt = SaltString::from_b64(&params.salt)
        .map_err(|e| VaultError::Config(format!("Invalid key derivation salt: {}", e)))?;

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32), // Output length for AES-256
    )
    .map_err(|e| VaultError::Config(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| VaultError::Encryption(format!("Key derivation failed: {}", e)))?;

    let hash_output = hash
        .hash
        .ok_or_else(|| VaultError::Encryption("No hash output generated".to_string()))?;

    let hash_bytes = hash_output.as_bytes();
    if hash_bytes.len() < 32 {
        return Err(VaultError::Encryption(
            "Hash output too short for AES-256 key".to_string(),
        ));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&hash_bytes[..32]);

    Ok(DerivedKey { key })
}
