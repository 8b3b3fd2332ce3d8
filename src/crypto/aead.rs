//! XChaCha20-Poly1305 record cipher.
//!
//! Ciphertext layout:
//! ```text
//! +--------------------+---------------------------+-----------------+
//! | Nonce              | Encrypted record          | Poly1305 tag    |
//! | 24 bytes (random)  | len(record) bytes         | 16 bytes        |
//! +--------------------+---------------------------+-----------------+
//! ```
//!
//! The 192-bit nonce is drawn from the OS RNG per record, so both peers can
//! share one key without coordinating counters across reconnections.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand::{RngCore, rngs::OsRng};

use super::keys::SessionKey;
use crate::core::{Cipher, CryptoError};

/// XChaCha20 nonce size.
pub const AEAD_NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// Bytes added to every record by [`SessionCipher`].
pub const CIPHER_OVERHEAD: usize = AEAD_NONCE_SIZE + AEAD_TAG_SIZE;

/// Pre-shared-key cipher used by both ends of a session.
pub struct SessionCipher {
    cipher: XChaCha20Poly1305,
    key: SessionKey,
}

impl SessionCipher {
    /// Create a cipher for the given key.
    pub fn new(key: SessionKey) -> Self {
        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        Self { cipher, key }
    }

    /// Create a cipher with a freshly generated key (server side).
    pub fn generate() -> Self {
        Self::new(SessionKey::generate())
    }

    /// The key, for printing to the client.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}

impl Cipher for SessionCipher {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(AEAD_NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < CIPHER_OVERHEAD {
            return Err(CryptoError::DecryptionFailed);
        }

        let (nonce, sealed) = ciphertext.split_at(AEAD_NONCE_SIZE);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}
