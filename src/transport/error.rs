//! Transport layer error types.
//!
//! Errors fall into four groups, and the classification helpers below are
//! what the connection uses to pick a recovery path:
//!
//! - **setup**: resolution, bind, listen, configuration; always fatal
//! - **peer loss**: the stream is gone or misaligned; client reconnects,
//!   server stops
//! - **protocol violation**: oversized or garbled frames, failed
//!   authentication; the stream is torn down, never resynchronized
//! - **transient**: interrupted or would-block syscalls, retried internally

use std::io;

use thiserror::Error;

use super::frame::FrameError;
use super::record::RecordError;
use crate::core::CryptoError;

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Address resolution failed or produced nothing usable.
    #[error("cannot resolve {host}: {reason}")]
    Resolve {
        /// The host:port that was looked up.
        host: String,
        /// Why it failed.
        reason: String,
    },

    /// No candidate address could be bound.
    #[error("bind failed: {0}")]
    Bind(io::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (socket operations).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A connection attempt did not complete in time.
    #[error("connect timeout")]
    ConnectTimeout,

    /// A write made no progress in time; the stream may hold a partial frame.
    #[error("write timeout")]
    WriteTimeout,

    /// An earlier write was cancelled part way; the stream is misaligned.
    #[error("a cancelled write left a partial frame on the stream")]
    InterruptedWrite,

    /// The peer closed the stream.
    #[error("connection closed")]
    ConnectionClosed,

    /// No peer is connected.
    #[error("not connected")]
    NotConnected,

    /// Framing violation.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Malformed record inside an authenticated frame.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// A record carried our own direction marker (reflected frame).
    #[error("record direction does not match peer role")]
    UnexpectedDirection,

    /// Invalid AEAD tag - frame authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Other cipher failure.
    #[error("crypto error: {0}")]
    Crypto(CryptoError),
}

impl From<CryptoError> for TransportError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::DecryptionFailed => TransportError::AuthenticationFailed,
            other => TransportError::Crypto(other),
        }
    }
}

impl TransportError {
    /// Check if this error happened while acquiring resources.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            TransportError::Resolve { .. } | TransportError::Bind(_) | TransportError::Config(_)
        )
    }

    /// Check if this error means the stream is gone or can no longer carry
    /// frames.
    pub fn is_peer_loss(&self) -> bool {
        match self {
            TransportError::ConnectionClosed
            | TransportError::WriteTimeout
            | TransportError::InterruptedWrite => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::WriteZero
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Check if this error is retried internally and never surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Io(e)
                if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
        )
    }

    /// Check if this error means the peer sent something it must not have.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            TransportError::Frame(_)
                | TransportError::Record(_)
                | TransportError::UnexpectedDirection
                | TransportError::AuthenticationFailed
        )
    }

    /// Check if this error is fatal to the current stream.
    ///
    /// Transient errors are the only ones that leave the stream usable.
    pub fn is_fatal_to_connection(&self) -> bool {
        !self.is_transient()
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_errors() {
        assert!(TransportError::Config("bad".into()).is_setup_error());
        assert!(TransportError::Bind(io::Error::from(io::ErrorKind::AddrInUse)).is_setup_error());
        assert!(
            TransportError::Resolve {
                host: "nowhere:1".into(),
                reason: "no addresses".into(),
            }
            .is_setup_error()
        );
        assert!(!TransportError::ConnectionClosed.is_setup_error());
    }

    #[test]
    fn test_peer_loss_errors() {
        assert!(TransportError::ConnectionClosed.is_peer_loss());
        assert!(TransportError::WriteTimeout.is_peer_loss());
        assert!(TransportError::InterruptedWrite.is_peer_loss());
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_peer_loss());
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_peer_loss());

        assert!(!TransportError::AuthenticationFailed.is_peer_loss());
        assert!(!TransportError::Io(io::Error::from(io::ErrorKind::Interrupted)).is_peer_loss());
    }

    #[test]
    fn test_transient_errors() {
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::Interrupted)).is_transient());
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::WouldBlock)).is_transient());
        assert!(!TransportError::ConnectTimeout.is_transient());
        assert!(TransportError::ConnectTimeout.is_fatal_to_connection());
    }

    #[test]
    fn test_protocol_violations() {
        assert!(TransportError::AuthenticationFailed.is_protocol_violation());
        assert!(TransportError::UnexpectedDirection.is_protocol_violation());
        assert!(
            TransportError::Frame(FrameError::FrameTooLarge {
                declared: u32::MAX,
                max: 16,
            })
            .is_protocol_violation()
        );
        assert!(TransportError::Record(RecordError::InvalidDirection(9)).is_protocol_violation());

        assert!(!TransportError::ConnectionClosed.is_protocol_violation());
    }

    #[test]
    fn test_decrypt_failure_maps_to_authentication() {
        let err: TransportError = CryptoError::DecryptionFailed.into();
        assert!(matches!(err, TransportError::AuthenticationFailed));

        let err: TransportError = CryptoError::EncryptionFailed.into();
        assert!(matches!(err, TransportError::Crypto(CryptoError::EncryptionFailed)));
    }
}
