//! Protocol constants for the TCP carrier.
//!
//! Values that appear on the wire MUST NOT be changed without a protocol
//! version bump; the timing values are tuning knobs shared by both peers.

use std::time::Duration;

// =============================================================================
// FRAMING
// =============================================================================

/// Size of the big-endian length prefix in front of every frame.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest ciphertext a single frame may carry (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1 << 20;

/// Largest read issued against the socket in one go.
pub const RECV_CHUNK_SIZE: usize = 4096;

/// Application MTU advertised to the layer above.
///
/// Larger than a datagram carrier's since the kernel segments the stream.
pub const DEFAULT_TCP_MTU: usize = 8192;

// =============================================================================
// PROTOCOL RECORD
// =============================================================================

/// Record header size (direction + timestamp + timestamp reply).
pub const RECORD_HEADER_SIZE: usize = 1 + 2 + 2;

/// Reserved 16-bit timestamp meaning "no echo yet".
pub const TIMESTAMP_NONE: u16 = u16::MAX;

/// Direction marker: client to server.
pub const DIRECTION_TO_SERVER: u8 = 0x00;

/// Direction marker: server to client.
pub const DIRECTION_TO_CLIENT: u8 = 0x01;

// =============================================================================
// TIMING
// =============================================================================

/// Default per-call I/O wait.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(500);

/// Lower bound for the I/O wait and the derived timeout.
pub const MIN_IO_TIMEOUT: Duration = Duration::from_millis(100);

/// Upper bound for the I/O wait and the derived timeout.
pub const MAX_IO_TIMEOUT: Duration = Duration::from_millis(1000);

/// Bound on a single connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// A peer timestamp held longer than this is not echoed.
pub const ECHO_HOLD_LIMIT: Duration = Duration::from_millis(1000);

/// RTT samples at or above this are discarded as degenerate.
pub const MAX_RTT_SAMPLE_MS: u16 = 5000;

// =============================================================================
// RECONNECTION
// =============================================================================

/// Base delay between reconnection attempts.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Largest exponent applied to the base delay.
pub const RECONNECT_MAX_EXPONENT: u32 = 5;

/// Hard ceiling on the reconnection delay.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_millis(5000);

// =============================================================================
// KEEPALIVE
// =============================================================================

/// Idle time before the kernel starts probing.
pub const KEEPALIVE_IDLE: Duration = Duration::from_secs(10);

/// Interval between keepalive probes.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(3);

/// Failed probes before the kernel declares the peer dead.
pub const KEEPALIVE_RETRIES: u32 = 3;

// =============================================================================
// SERVER
// =============================================================================

/// Listen backlog: one peer per session.
pub const LISTEN_BACKLOG: u32 = 1;

/// Low end of the conventional server port range.
pub const PORT_RANGE_LOW: u16 = 60001;

/// High end of the conventional server port range.
pub const PORT_RANGE_HIGH: u16 = 60999;
