//! Pre-shared session key.
//!
//! Both peers hold the same 32-byte key, handed to the client out of band
//! (typically printed by the server as hex).

use rand::{RngCore, rngs::OsRng};
use zeroize::Zeroize;

use crate::core::CryptoError;

/// Size of the session key (32 bytes for XChaCha20).
pub const SESSION_KEY_SIZE: usize = 32;

/// A symmetric session key.
///
/// Zeroized on drop for security.
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; SESSION_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Create a session key from bytes.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Parse a key from its printable hex form.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let mut key = [0u8; SESSION_KEY_SIZE];
        hex::decode_to_slice(text.trim(), &mut key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Printable hex form of the key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.key)
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let key = SessionKey::generate();
        let parsed = SessionKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(matches!(
            SessionKey::from_hex("abcd"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        let text = "zz".repeat(SESSION_KEY_SIZE);
        assert!(SessionKey::from_hex(&text).is_err());
    }

    #[test]
    fn test_debug_hides_material() {
        let key = SessionKey::from_bytes([0x42; SESSION_KEY_SIZE]);
        assert_eq!(format!("{key:?}"), "SessionKey(..)");
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(
            SessionKey::generate().as_bytes(),
            SessionKey::generate().as_bytes()
        );
    }
}
