//! Connection lifecycle state machine.
//!
//! ```text
//!   server:  listen ──► Listening ──accept──► Connected ──loss──► Disconnected
//!   client:  connect ─────────────────────► Connected ──loss──► Reconnecting
//!                                                ▲                  │
//!                                                └──── attempt ok ──┘
//! ```
//!
//! Each state owns the one socket that is live in it, so "at most one socket
//! open" holds by construction. Transitions move the old state out and put
//! the new one in; dropping the old state releases its socket.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::{debug, info};

use super::backoff::Backoff;
use super::config::{ClientConfig, ServerConfig, clamp_io_timeout};
use super::error::{TransportError, TransportResult};
use super::frame::FrameAccumulator;
use super::socket;
use crate::core::RECV_CHUNK_SIZE;

/// Which end of the session this is. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Binds, accepts exactly one peer, never reconnects.
    Server,
    /// Connects to a fixed address, reconnects on loss.
    Client,
}

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Server waiting for its peer.
    Listening,
    /// Stream established.
    Connected,
    /// Client between a loss and the next successful attempt.
    Reconnecting,
    /// No socket and no way back (server after loss, or closed).
    Disconnected,
}

enum LinkState {
    Listening(TcpListener),
    Connected(TcpStream),
    Reconnecting(Backoff),
    Disconnected,
}

impl LinkState {
    fn phase(&self) -> Phase {
        match self {
            LinkState::Listening(_) => Phase::Listening,
            LinkState::Connected(_) => Phase::Connected,
            LinkState::Reconnecting(_) => Phase::Reconnecting,
            LinkState::Disconnected => Phase::Disconnected,
        }
    }
}

impl std::fmt::Debug for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Reconnecting(backoff) => f.debug_tuple("Reconnecting").field(backoff).finish(),
            other => write!(f, "{:?}", other.phase()),
        }
    }
}

/// The socket-owning half of a connection.
#[derive(Debug)]
pub struct Link {
    role: Role,
    state: LinkState,
    /// Server: set on accept. Client: the fixed server address.
    remote_addr: Option<SocketAddr>,
    /// Server: the bound port.
    bound_port: Option<u16>,
    io_timeout: Duration,
    connect_timeout: Duration,
    accumulator: FrameAccumulator,
    /// Set while a frame is being written; stays set if that write is
    /// cancelled, since part of the frame may already be on the wire.
    write_in_flight: bool,
}

impl Link {
    /// Bind and listen (server role).
    ///
    /// Tries every port of the configured range against every resolved
    /// address, keeping the first that binds. Without a bind host the
    /// dual-stack IPv6 wildcard is tried before the IPv4 one.
    pub async fn listen(config: &ServerConfig) -> TransportResult<Self> {
        config.validate()?;

        let candidates = match config.bind_host.as_deref() {
            Some(host) => socket::resolve(host, 0).await?,
            None => vec![
                SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            ],
        };

        let mut last_error = None;
        for port in config.ports.iter() {
            for mut addr in candidates.iter().copied() {
                addr.set_port(port);
                match socket::bind_listener(addr) {
                    Ok(listener) => {
                        let bound = listener.local_addr()?;
                        info!(addr = %bound, "listening");
                        return Ok(Self {
                            role: Role::Server,
                            state: LinkState::Listening(listener),
                            remote_addr: None,
                            bound_port: Some(bound.port()),
                            io_timeout: clamp_io_timeout(config.io_timeout),
                            connect_timeout: Duration::ZERO,
                            accumulator: FrameAccumulator::with_max_frame_size(
                                config.max_frame_size,
                            ),
                            write_in_flight: false,
                        });
                    }
                    Err(e) => {
                        debug!(%addr, error = %e, "bind failed");
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(TransportError::Bind(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no candidate address")
        })))
    }

    /// Resolve and connect (client role).
    ///
    /// The first resolved address becomes the fixed reconnection target. A
    /// failed initial connect is a setup failure.
    pub async fn connect(config: &ClientConfig) -> TransportResult<Self> {
        config.validate()?;

        let remote = socket::resolve(&config.host, config.port).await?[0];
        let stream = open_stream(remote, config.connect_timeout).await?;
        info!(%remote, "connected");

        Ok(Self {
            role: Role::Client,
            state: LinkState::Connected(stream),
            remote_addr: Some(remote),
            bound_port: None,
            io_timeout: clamp_io_timeout(config.io_timeout),
            connect_timeout: config.connect_timeout,
            accumulator: FrameAccumulator::with_max_frame_size(config.max_frame_size),
            write_in_flight: false,
        })
    }

    /// Role of this end.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Whether a data stream is established.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected(_))
    }

    /// Remote peer address, once known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Local port: the bound port (server) or the stream's port (client).
    pub fn local_port(&self) -> Option<u16> {
        match (self.role, &self.state) {
            (Role::Server, _) => self.bound_port,
            (Role::Client, LinkState::Connected(stream)) => {
                stream.local_addr().ok().map(|a| a.port())
            }
            (Role::Client, _) => None,
        }
    }

    /// Per-call I/O wait.
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Override the per-call I/O wait (clamped).
    pub fn set_io_timeout(&mut self, timeout: Duration) {
        self.io_timeout = clamp_io_timeout(timeout);
    }

    /// Largest frame accepted in either direction.
    pub fn max_frame_size(&self) -> usize {
        self.accumulator.max_frame_size()
    }

    /// Bytes of an incomplete frame currently buffered.
    pub fn buffered(&self) -> usize {
        self.accumulator.len()
    }

    /// Reconnection attempts since the last loss (client only).
    pub fn reconnect_attempts(&self) -> Option<u32> {
        match &self.state {
            LinkState::Reconnecting(backoff) => Some(backoff.attempt()),
            _ => None,
        }
    }

    /// Descriptors the caller should poll: the listener while a server waits
    /// for its peer, the stream once connected.
    #[cfg(unix)]
    pub fn raw_fds(&self) -> Vec<std::os::fd::RawFd> {
        use std::os::fd::AsRawFd;

        match &self.state {
            LinkState::Listening(listener) => vec![listener.as_raw_fd()],
            LinkState::Connected(stream) => vec![stream.as_raw_fd()],
            LinkState::Reconnecting(_) | LinkState::Disconnected => Vec::new(),
        }
    }

    /// Wait up to the I/O timeout for the server's one peer.
    ///
    /// Returns `Ok(false)` if nobody showed up; that is the normal polling
    /// state, not an error. On success the listener is closed.
    pub async fn accept(&mut self) -> TransportResult<bool> {
        let LinkState::Listening(listener) = &self.state else {
            return Ok(self.is_connected());
        };

        let (stream, peer) = match tokio::time::timeout(self.io_timeout, listener.accept()).await {
            Err(_) => return Ok(false),
            Ok(Err(e)) if is_retryable_accept(&e) => {
                debug!(error = %e, "accept interrupted");
                return Ok(false);
            }
            Ok(Err(e)) => return Err(TransportError::Io(e)),
            Ok(Ok(accepted)) => accepted,
        };

        // Still listening if this fails; the accepted stream is dropped.
        socket::configure_stream(&stream)?;

        self.state = LinkState::Connected(stream);
        self.remote_addr = Some(peer);
        info!(%peer, "peer connected");
        Ok(true)
    }

    /// Make at most one reconnection attempt (client only).
    ///
    /// Returns immediately if the backoff deadline has not arrived. Returns
    /// whether a stream is established afterwards.
    pub async fn try_reconnect(&mut self) -> bool {
        let (LinkState::Reconnecting(backoff), Some(remote)) = (&self.state, self.remote_addr)
        else {
            return self.is_connected();
        };
        if !backoff.is_due(Instant::now()) {
            return false;
        }

        match open_stream(remote, self.connect_timeout).await {
            Ok(stream) => {
                let attempts = self.reconnect_attempts().unwrap_or(0);
                self.state = LinkState::Connected(stream);
                // Nothing buffered from the old stream continues on the new one.
                self.accumulator.clear();
                info!(%remote, attempts, "reconnected");
                true
            }
            Err(e) => {
                if let LinkState::Reconnecting(backoff) = &mut self.state {
                    let delay = backoff.on_failure(Instant::now());
                    debug!(
                        %remote,
                        attempt = backoff.attempt(),
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "reconnect attempt failed"
                    );
                }
                false
            }
        }
    }

    /// Tear down the data stream after a failure.
    ///
    /// Client: enter reconnection with the first attempt due now.
    /// Server: terminal disconnection.
    pub fn tear_down(&mut self) {
        self.release();
        self.state = match self.role {
            Role::Client => {
                info!("connection lost, reconnecting");
                LinkState::Reconnecting(Backoff::new(Instant::now()))
            }
            Role::Server => {
                info!("connection lost");
                LinkState::Disconnected
            }
        };
    }

    /// Release whatever socket is held. Idempotent.
    pub fn close(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let LinkState::Connected(stream) = &self.state {
            socket::shutdown_both(stream);
        }
        self.state = LinkState::Disconnected;
        self.write_in_flight = false;
    }

    /// Write a whole frame, looping over partial writes.
    ///
    /// Each write waits at most the I/O timeout for the socket to accept
    /// bytes. A timeout may leave part of the frame on the wire, so the
    /// caller must treat it as fatal to the stream. The same holds if the
    /// returned future is dropped early: every later read or write on this
    /// stream then fails with [`TransportError::InterruptedWrite`].
    pub async fn write_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        if self.write_in_flight {
            return Err(TransportError::InterruptedWrite);
        }
        let LinkState::Connected(stream) = &mut self.state else {
            return Err(TransportError::NotConnected);
        };

        self.write_in_flight = true;
        let mut written = 0;
        while written < frame.len() {
            match tokio::time::timeout(self.io_timeout, stream.write(&frame[written..])).await {
                Err(_) => return Err(TransportError::WriteTimeout),
                Ok(Ok(0)) => return Err(TransportError::Io(io::ErrorKind::WriteZero.into())),
                Ok(Ok(n)) => written += n,
                Ok(Err(e)) if is_transient(&e) => continue,
                Ok(Err(e)) => return Err(TransportError::Io(e)),
            }
        }
        self.write_in_flight = false;
        Ok(())
    }

    /// Read until one complete frame is buffered or the I/O timeout passes.
    ///
    /// The whole call shares one deadline. `Ok(None)` means no complete frame
    /// arrived in time; any partial frame stays buffered for the next call.
    pub async fn read_frame(&mut self) -> TransportResult<Option<Vec<u8>>> {
        if self.write_in_flight {
            return Err(TransportError::InterruptedWrite);
        }
        let LinkState::Connected(stream) = &mut self.state else {
            return Err(TransportError::NotConnected);
        };

        let deadline = Instant::now() + self.io_timeout;
        let mut chunk = [0u8; RECV_CHUNK_SIZE];
        loop {
            if let Some(frame) = self.accumulator.next_frame()? {
                return Ok(Some(frame));
            }

            // Never read past the cap; a full accumulator always holds a frame.
            let want = RECV_CHUNK_SIZE.min(self.accumulator.remaining_capacity()).max(1);
            match tokio::time::timeout_at(deadline, stream.read(&mut chunk[..want])).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => return Err(TransportError::ConnectionClosed),
                Ok(Ok(n)) => self.accumulator.extend(&chunk[..n])?,
                Ok(Err(e)) if is_transient(&e) => continue,
                Ok(Err(e)) => return Err(TransportError::Io(e)),
            }
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.release();
    }
}

/// Connect and apply stream options; the stream is dropped if options fail.
async fn open_stream(remote: SocketAddr, timeout: Duration) -> TransportResult<TcpStream> {
    let stream = socket::connect_with_timeout(remote, timeout).await?;
    socket::configure_stream(&stream)?;
    Ok(stream)
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

/// Accept failures that only concern one aborted handshake.
fn is_retryable_accept(e: &io::Error) -> bool {
    is_transient(e) || e.kind() == io::ErrorKind::ConnectionAborted
}
