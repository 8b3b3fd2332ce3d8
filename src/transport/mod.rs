//! Transport layer: a reconnecting, encrypted TCP carrier.
//!
//! - **Framing**: [`encode_frame`] and [`FrameAccumulator`], 4-byte
//!   big-endian length prefix with a hard size cap
//! - **Records**: [`Record`] carrying direction, timestamp and echo
//! - **RTT estimation**: [`RttEstimator`] fed by [`TimestampTracker`] echoes
//! - **Lifecycle**: [`Link`] owns the one live socket and the non-blocking
//!   reconnection schedule ([`Backoff`])
//! - **Facade**: [`TcpConnection`], the send/receive/describe contract
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         State synchronization           │
//! ├─────────────────────────────────────────┤
//! │   TcpConnection  (records, RTT)         │  ← This module
//! │   Cipher         (encrypt / decrypt)    │
//! │   Framer         (length prefix)        │
//! │   Link           (listen/accept/connect,│
//! │                   reconnect backoff)    │
//! ├─────────────────────────────────────────┤
//! │              TCP                        │
//! └─────────────────────────────────────────┘
//! ```

mod backoff;
mod config;
mod connection;
mod error;
mod frame;
mod link;
mod record;
pub mod socket;
mod timing;

pub use backoff::{Backoff, reconnect_delay};
pub use config::{ClientConfig, PortRange, ServerConfig, clamp_io_timeout};
pub use connection::{Received, SendOutcome, TcpConnection};
pub use error::{TransportError, TransportResult};
pub use frame::{FrameAccumulator, FrameError, encode_frame, encode_frame_with_max};
pub use link::{Link, Phase, Role};
pub use record::{Direction, Record, RecordError};
pub use timing::{
    RttEstimator, TimestampTracker, constants as timing_constants, timestamp16, timestamp_diff,
};
