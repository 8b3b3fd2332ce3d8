//! Collaborator traits.
//!
//! [`Cipher`] is the seam to the symmetric-encryption service, and
//! [`Connection`] is the contract every carrier (stream or datagram) offers
//! to the state-synchronization layer above it.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use super::error::CryptoError;
use crate::transport::{Received, SendOutcome, TransportResult};

/// Symmetric authenticated encryption of whole records.
///
/// Implementations own their nonce discipline; the carrier treats
/// ciphertext as opaque bytes.
pub trait Cipher: Send {
    /// Encrypt a plaintext record.
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt a ciphertext record.
    ///
    /// MUST fail with [`CryptoError::DecryptionFailed`] on any tampering or
    /// corruption. The carrier never retries the same bytes.
    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// An encrypted, message-oriented carrier.
///
/// Every method returns within a bounded time. `send` and `receive` are
/// at-most-one-attempt: a call that cannot make progress returns
/// [`SendOutcome`]/[`Received::NoDataYet`] rather than waiting.
pub trait Connection {
    /// Encrypt and transmit one message.
    fn send(&mut self, payload: &[u8]) -> impl Future<Output = TransportResult<SendOutcome>> + Send;

    /// Receive and decrypt at most one message.
    fn receive(&mut self) -> impl Future<Output = TransportResult<Received>> + Send;

    /// Advised retransmission timeout derived from the RTT estimate.
    fn timeout(&self) -> Duration;

    /// Application MTU in bytes.
    fn mtu(&self) -> usize;

    /// Local port, if a socket is bound.
    fn local_port(&self) -> Option<u16>;

    /// Local port as a decimal string (empty if none).
    fn port(&self) -> String {
        self.local_port().map(|p| p.to_string()).unwrap_or_default()
    }

    /// Whether the remote peer's address is known.
    fn has_remote_addr(&self) -> bool {
        self.remote_addr().is_some()
    }

    /// Remote peer address, if known.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Smoothed round-trip time in milliseconds.
    fn srtt(&self) -> f64;

    /// Record the time (ms) of the last successful round trip, as seen by
    /// the layer above.
    fn set_last_roundtrip_success(&mut self, timestamp_ms: u64);

    /// Description of the latest send failure, empty after a success.
    fn send_error(&self) -> &str;

    /// Descriptors for external multiplexing.
    #[cfg(unix)]
    fn raw_fds(&self) -> Vec<std::os::fd::RawFd>;
}
