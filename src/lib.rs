//! # tether-tcp
//!
//! A reconnecting, encrypted, message-oriented carrier over TCP for
//! remote-terminal state synchronization.
//!
//! One server accepts exactly one client. Every message is encrypted with a
//! pre-shared key, stamped for round-trip measurement, and length-prefixed
//! on the stream. A client that loses its server reconnects on its own,
//! without ever stalling the caller's event loop:
//!
//! - **Bounded calls**: `send`/`receive` return within the configured I/O wait
//! - **Non-blocking reconnection**: exponential backoff by timestamp, never sleep
//! - **Strict framing**: a hard frame cap in both directions, no resynchronization
//! - **RTT estimation**: smoothed from echoed 16-bit timestamps
//!
//! ## Feature Flags
//!
//! - `crypto` (default): [`crypto::SessionCipher`], XChaCha20-Poly1305 with a
//!   pre-shared [`crypto::SessionKey`]
//!
//! ## Modules
//!
//! - [`core`]: Collaborator traits, constants, and error types
//! - [`transport`]: Framing, timing, lifecycle, and the [`TcpConnection`] facade
//! - [`crypto`]: Pre-shared-key cipher (requires `crypto` feature)
//!
//! ## Example Usage
//!
//! ```no_run
//! use tether_tcp::prelude::*;
//!
//! # async fn run() -> Result<(), TransportError> {
//! let key = SessionKey::generate();
//! let server_config = ServerConfig::new(None, PortRange::conventional());
//! let mut server = TcpConnection::server(server_config, SessionCipher::new(key.clone())).await?;
//!
//! let port = server.local_port().unwrap_or_default();
//! let mut client =
//!     TcpConnection::client(ClientConfig::new("127.0.0.1", port), SessionCipher::new(key)).await?;
//!
//! client.send(b"hello").await?;
//! loop {
//!     if let Received::Payload(payload) = server.receive().await? {
//!         assert_eq!(payload, b"hello");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Transport layer (always included)
pub mod transport;

// Crypto layer (feature-gated)
#[cfg(feature = "crypto")]
#[cfg_attr(docsrs, doc(cfg(feature = "crypto")))]
pub mod crypto;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{Cipher, Connection, CryptoError};
    pub use crate::transport::{
        ClientConfig, Phase, PortRange, Received, Role, SendOutcome, ServerConfig, TcpConnection,
        TransportError, TransportResult,
    };

    #[cfg(feature = "crypto")]
    pub use crate::crypto::{SessionCipher, SessionKey};
}

pub use crate::core::{Cipher, Connection};
pub use transport::{Received, SendOutcome, TcpConnection, TransportError};
