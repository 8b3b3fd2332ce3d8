//! Server and client configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::{TransportError, TransportResult};
use crate::core::{
    CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT, MAX_FRAME_SIZE, MAX_IO_TIMEOUT, MIN_IO_TIMEOUT,
    PORT_RANGE_HIGH, PORT_RANGE_LOW,
};

/// Clamp an I/O wait into the allowed range.
pub fn clamp_io_timeout(timeout: Duration) -> Duration {
    timeout.clamp(MIN_IO_TIMEOUT, MAX_IO_TIMEOUT)
}

/// Inclusive range of ports a server may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    low: u16,
    high: u16,
}

impl PortRange {
    /// A single port; `0` lets the OS choose.
    pub fn single(port: u16) -> Self {
        Self {
            low: port,
            high: port,
        }
    }

    /// An inclusive range.
    pub fn new(low: u16, high: u16) -> TransportResult<Self> {
        if low > high {
            return Err(TransportError::Config(format!(
                "port range {low}:{high} is inverted"
            )));
        }
        Ok(Self { low, high })
    }

    /// The conventional server range (60001:60999).
    pub fn conventional() -> Self {
        Self {
            low: PORT_RANGE_LOW,
            high: PORT_RANGE_HIGH,
        }
    }

    /// Parse `"PORT"` or `"LOW:HIGH"`.
    pub fn parse(text: &str) -> TransportResult<Self> {
        let invalid = || TransportError::Config(format!("invalid port or port range: {text:?}"));
        let parse_port = |s: &str| s.trim().parse::<u16>().map_err(|_| invalid());

        match text.split_once(':') {
            Some((low, high)) => Self::new(parse_port(low)?, parse_port(high)?),
            None => Ok(Self::single(parse_port(text)?)),
        }
    }

    /// Lowest port.
    pub fn low(&self) -> u16 {
        self.low
    }

    /// Highest port.
    pub fn high(&self) -> u16 {
        self.high
    }

    /// Ports in bind order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + use<> {
        self.low..=self.high
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::single(0)
    }
}

impl FromStr for PortRange {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.low == self.high {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}:{}", self.low, self.high)
        }
    }
}

fn check_max_frame_size(max_frame_size: usize) -> TransportResult<()> {
    if max_frame_size == 0 || max_frame_size > MAX_FRAME_SIZE {
        return Err(TransportError::Config(format!(
            "max frame size {max_frame_size} outside 1..={MAX_FRAME_SIZE}"
        )));
    }
    Ok(())
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Local address to bind (`None` = all interfaces).
    pub bind_host: Option<String>,
    /// Ports to try, in order.
    pub ports: PortRange,
    /// Per-call I/O wait.
    pub io_timeout: Duration,
    /// Largest accepted frame.
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: None,
            ports: PortRange::default(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    /// Create a config binding `host` (or all interfaces) on `ports`.
    pub fn new(bind_host: Option<&str>, ports: PortRange) -> Self {
        Self {
            bind_host: bind_host.map(str::to_owned),
            ports,
            ..Self::default()
        }
    }

    /// Set the per-call I/O wait (clamped).
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = clamp_io_timeout(timeout);
        self
    }

    /// Lower the maximum frame size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Check the configuration before any socket is created.
    pub fn validate(&self) -> TransportResult<()> {
        check_max_frame_size(self.max_frame_size)
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Per-call I/O wait.
    pub io_timeout: Duration,
    /// Bound on one connection attempt.
    pub connect_timeout: Duration,
    /// Largest accepted frame.
    pub max_frame_size: usize,
}

impl ClientConfig {
    /// Create a config for `host:port` with default timings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            io_timeout: DEFAULT_IO_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Set the per-call I/O wait (clamped).
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = clamp_io_timeout(timeout);
        self
    }

    /// Set the bound on one connection attempt.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Lower the maximum frame size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Check the configuration before any socket is created.
    pub fn validate(&self) -> TransportResult<()> {
        if self.host.is_empty() {
            return Err(TransportError::Config("empty server host".into()));
        }
        if self.port == 0 {
            return Err(TransportError::Config("server port must be non-zero".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(TransportError::Config("connect timeout must be non-zero".into()));
        }
        check_max_frame_size(self.max_frame_size)
    }
}
