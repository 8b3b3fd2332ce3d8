//! TCP socket setup.
//!
//! Thin helpers over tokio's sockets: address resolution, a single-peer
//! listener, connect-with-timeout, and the low-latency/keepalive options
//! applied to every data stream. `socket2` covers the keepalive probe timing
//! that tokio does not expose.

use std::io;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use socket2::{SockAddr, SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::debug;

use super::error::{TransportError, TransportResult};
use crate::core::{KEEPALIVE_IDLE, KEEPALIVE_INTERVAL, KEEPALIVE_RETRIES, LISTEN_BACKLOG};

/// Resolve `host:port` to candidate addresses, in resolver order.
pub async fn resolve(host: &str, port: u16) -> TransportResult<Vec<SocketAddr>> {
    let resolve_error = |reason: String| TransportError::Resolve {
        host: format!("{host}:{port}"),
        reason,
    };

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| resolve_error(e.to_string()))?
        .collect();

    if addrs.is_empty() {
        return Err(resolve_error("no addresses".into()));
    }
    Ok(addrs)
}

fn new_socket(addr: &SocketAddr) -> io::Result<TcpSocket> {
    if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
}

/// Bind a listener for exactly one peer.
///
/// Sets address reuse so a restarted server can reclaim its port while the
/// previous session's connection sits in TIME_WAIT. IPv6 listeners also
/// accept IPv4 peers where the platform allows it. The socket is released
/// on any failure.
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = new_socket(&addr)?;
    socket.set_reuseaddr(true)?;
    if addr.is_ipv6() {
        if let Err(e) = SockRef::from(&socket).set_only_v6(false) {
            debug!(error = %e, "could not enable dual-stack listening");
        }
    }
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Open a stream to `addr`, giving up after `timeout`.
///
/// The connect is non-blocking underneath; the only wait is for the
/// handshake to finish. A pending socket is dropped (closed) on timeout.
pub async fn connect_with_timeout(addr: SocketAddr, timeout: Duration) -> TransportResult<TcpStream> {
    let socket = new_socket(&addr)?;
    match tokio::time::timeout(timeout, socket.connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(TransportError::Io(e)),
        Err(_) => Err(TransportError::ConnectTimeout),
    }
}

/// Apply the data-stream options.
///
/// `TCP_NODELAY` and `SO_KEEPALIVE` are required; the probe timing is
/// best-effort since not every platform exposes it.
pub fn configure_stream(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;

    let sock = SockRef::from(stream);
    sock.set_keepalive(true)?;

    let params = TcpKeepalive::new().with_time(KEEPALIVE_IDLE);
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
    ))]
    let params = params
        .with_interval(KEEPALIVE_INTERVAL)
        .with_retries(KEEPALIVE_RETRIES);

    if let Err(e) = sock.set_tcp_keepalive(&params) {
        debug!(error = %e, "could not set keepalive probe timing");
    }
    Ok(())
}

/// Shut down both directions; errors (e.g. already reset) are ignored.
pub fn shutdown_both(stream: &TcpStream) {
    if let Err(e) = SockRef::from(stream).shutdown(Shutdown::Both) {
        debug!(error = %e, "shutdown failed");
    }
}

/// Size of the native socket address structure for `addr`.
pub fn sockaddr_len(addr: &SocketAddr) -> u32 {
    SockAddr::from(*addr).len() as u32
}
