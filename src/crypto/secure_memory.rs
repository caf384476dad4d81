//! Secure memory handling for the encryption secret
//!
//! The passphrase read from the environment or a prompt is held in a
//! `SecureString`, which zeroes its buffer on drop and never prints its
//! contents.

use std::fmt;
use std::ops::Deref;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string type that zeros its contents on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    pub fn new(s: impl Into<String>) -> Self {
        Self { inner: s.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Read a secret from an environment variable, ignoring empty values
    pub fn from_env(name: &str) -> Option<Self> {
        std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }
}

impl Deref for SecureString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// Don't print the contents in Debug output
impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureString")
            .field("len", &self.inner.len())
            .finish()
    }
}

// Don't print the contents in Display output
impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED {} bytes]", self.inner.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_string_deref() {
        let secret = SecureString::new("hunter2");
        assert_eq!(&*secret, "hunter2");
        assert_eq!(secret.len(), 7);
    }

    #[test]
    fn test_secure_string_redacted() {
        let secret = SecureString::from("hunter2");
        assert_eq!(format!("{}", secret), "[REDACTED 7 bytes]");
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    #[test]
    fn test_zeroize_clears() {
        let mut secret = SecureString::new("hunter2");
        secret.zeroize();
        assert!(secret.is_empty());
    }
}
