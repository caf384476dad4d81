//! Cryptographic functions for contract-vault
//!
//! Provides AES-256-GCM encryption with Argon2id key derivation for
//! optional at-rest encryption of backup artifacts.

pub mod encryption;
pub mod key_derivation;
pub mod secure_memory;

pub use encryption::{
    decode_iv, decrypt, encode_iv, encrypt, BackupCipher, EncryptionAlgorithm, IV_SIZE,
};
pub use key_derivation::{derive_key, DerivedKey, KeyDerivationParams};
pub use secure_memory::SecureString;
