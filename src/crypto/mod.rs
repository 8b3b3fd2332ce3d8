//! Security layer: pre-shared key and record cipher.
//!
//! - **Key**: [`SessionKey`], 32 random bytes shared out of band
//! - **AEAD**: [`SessionCipher`], XChaCha20-Poly1305 with random nonces

mod aead;
mod keys;

pub use aead::{AEAD_NONCE_SIZE, AEAD_TAG_SIZE, CIPHER_OVERHEAD, SessionCipher};
pub use keys::{SESSION_KEY_SIZE, SessionKey};
