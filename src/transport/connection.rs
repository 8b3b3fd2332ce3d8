//! The encrypted carrier seen by the layer above.
//!
//! [`TcpConnection`] composes the pieces of this module: a record is stamped
//! by the [`TimestampTracker`], encrypted by the [`Cipher`], framed, and
//! written through the [`Link`]. Receiving runs the same pipeline in
//! reverse and feeds the [`RttEstimator`].

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::config::{ClientConfig, ServerConfig};
use super::error::{TransportError, TransportResult};
use super::frame::encode_frame_with_max;
use super::link::{Link, Phase, Role};
use super::record::{Direction, Record};
use super::socket::sockaddr_len;
use super::timing::{RttEstimator, TimestampTracker};
use crate::core::{Cipher, Connection, DEFAULT_TCP_MTU};

/// Result of one [`TcpConnection::receive`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// One decrypted application payload.
    Payload(Vec<u8>),
    /// Nothing complete arrived in time. Not an error; call again later.
    NoDataYet,
}

impl Received {
    /// The payload, if one arrived.
    pub fn into_payload(self) -> Option<Vec<u8>> {
        match self {
            Received::Payload(payload) => Some(payload),
            Received::NoDataYet => None,
        }
    }
}

/// Result of one [`TcpConnection::send`] call that did not fail hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The whole frame was written.
    Sent,
    /// No peer (server before accept, or after close). Nothing was written.
    NotConnected,
    /// Client is reconnecting, or lost the stream while writing. The layer
    /// above retransmits on its own schedule.
    Dropped,
}

/// Reconnecting, encrypted, message-oriented TCP carrier.
#[derive(Debug)]
pub struct TcpConnection<C: Cipher> {
    link: Link,
    cipher: C,
    /// Marker stamped on outgoing records.
    direction: Direction,
    rtt: RttEstimator,
    timestamps: TimestampTracker,
    send_error: String,
    last_heard: Option<Instant>,
    last_roundtrip_success: u64,
}

impl<C: Cipher> TcpConnection<C> {
    /// Bind a server and start listening for its one peer.
    pub async fn server(config: ServerConfig, cipher: C) -> TransportResult<Self> {
        let link = Link::listen(&config).await?;
        Ok(Self::with_link(link, cipher, Direction::ToClient))
    }

    /// Connect a client to its server.
    pub async fn client(config: ClientConfig, cipher: C) -> TransportResult<Self> {
        let link = Link::connect(&config).await?;
        Ok(Self::with_link(link, cipher, Direction::ToServer))
    }

    fn with_link(link: Link, cipher: C, direction: Direction) -> Self {
        Self {
            link,
            cipher,
            direction,
            rtt: RttEstimator::new(),
            timestamps: TimestampTracker::new(),
            send_error: String::new(),
            last_heard: None,
            last_roundtrip_success: 0,
        }
    }

    /// Encrypt and transmit one message.
    ///
    /// Local failures (payload too large, cipher error) are returned before
    /// anything is written and leave the stream untouched. A write failure
    /// tears the stream down: a client absorbs it into reconnection, a
    /// server surfaces it.
    ///
    /// Dropping the future before it completes may leave half a frame on
    /// the wire. The next `send` or `receive` detects that and tears the
    /// stream down the same way.
    pub async fn send(&mut self, payload: &[u8]) -> TransportResult<SendOutcome> {
        if self.link.role() == Role::Client {
            self.link.try_reconnect().await;
        }

        match self.link.phase() {
            Phase::Connected => {}
            Phase::Reconnecting => {
                self.send_error = "reconnecting".into();
                return Ok(SendOutcome::Dropped);
            }
            Phase::Listening | Phase::Disconnected => {
                self.send_error = TransportError::NotConnected.to_string();
                return Ok(SendOutcome::NotConnected);
            }
        }

        let record = Record::new(
            self.direction,
            self.timestamps.now(),
            self.timestamps.take_reply(),
            payload.to_vec(),
        );
        let ciphertext = self.cipher.encrypt(&record.to_bytes())?;
        let frame = encode_frame_with_max(&ciphertext, self.link.max_frame_size())?;

        match self.link.write_frame(&frame).await {
            Ok(()) => {
                self.send_error.clear();
                trace!(payload = payload.len(), frame = frame.len(), "sent");
                Ok(SendOutcome::Sent)
            }
            Err(e) => {
                debug!(error = %e, "send failed");
                self.send_error = e.to_string();
                self.link.tear_down();
                match self.link.role() {
                    Role::Client => Ok(SendOutcome::Dropped),
                    Role::Server => Err(e),
                }
            }
        }
    }

    /// Receive and decrypt at most one message.
    ///
    /// A server without its peer makes one accept attempt; a reconnecting
    /// client makes at most one reconnection attempt. Either returns
    /// [`Received::NoDataYet`] if that did not produce a stream.
    ///
    /// Peer loss is absorbed by a client (it starts reconnecting) and
    /// surfaced by a server. Protocol violations are surfaced by both, after
    /// the stream has been torn down.
    pub async fn receive(&mut self) -> TransportResult<Received> {
        match self.link.phase() {
            Phase::Connected => {}
            Phase::Listening => {
                if !self.link.accept().await? {
                    return Ok(Received::NoDataYet);
                }
            }
            Phase::Reconnecting => {
                if !self.link.try_reconnect().await {
                    return Ok(Received::NoDataYet);
                }
            }
            Phase::Disconnected => {
                return Err(match self.link.role() {
                    Role::Server => TransportError::ConnectionClosed,
                    Role::Client => TransportError::NotConnected,
                });
            }
        }

        match self.receive_record().await {
            Ok(Some(payload)) => Ok(Received::Payload(payload)),
            Ok(None) => Ok(Received::NoDataYet),
            Err(e) => {
                debug!(error = %e, "receive failed");
                self.link.tear_down();
                match self.link.role() {
                    Role::Client if !e.is_protocol_violation() => Ok(Received::NoDataYet),
                    _ => Err(e),
                }
            }
        }
    }

    async fn receive_record(&mut self) -> TransportResult<Option<Vec<u8>>> {
        let Some(frame) = self.link.read_frame().await? else {
            return Ok(None);
        };

        let plaintext = self.cipher.decrypt(&frame)?;
        let record = Record::from_bytes(&plaintext)?;
        if record.direction != self.direction.reverse() {
            return Err(TransportError::UnexpectedDirection);
        }

        if let Some(sample) = self
            .timestamps
            .on_receive(record.timestamp, record.timestamp_reply)
        {
            self.rtt.record_sample(sample);
        }
        self.last_heard = Some(Instant::now());

        trace!(payload = record.payload.len(), frame = frame.len(), "received");
        Ok(Some(record.payload))
    }

    /// Role of this end.
    pub fn role(&self) -> Role {
        self.link.role()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.link.phase()
    }

    /// Local port, if a socket is bound.
    pub fn local_port(&self) -> Option<u16> {
        self.link.local_port()
    }

    /// Remote peer address, if known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.link.remote_addr()
    }

    /// Native socket address length of the peer address (0 if unknown).
    pub fn remote_addr_len(&self) -> u32 {
        self.link.remote_addr().as_ref().map_or(0, sockaddr_len)
    }

    /// Smoothed round-trip time in milliseconds.
    pub fn srtt(&self) -> f64 {
        self.rtt.srtt_ms()
    }

    /// The round-trip estimator.
    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// Advised retransmission timeout.
    pub fn timeout(&self) -> Duration {
        self.rtt.current_timeout()
    }

    /// Per-call I/O wait.
    pub fn io_timeout(&self) -> Duration {
        self.link.io_timeout()
    }

    /// Override the per-call I/O wait (clamped).
    pub fn set_io_timeout(&mut self, timeout: Duration) {
        self.link.set_io_timeout(timeout);
    }

    /// Latest send failure, empty after a successful send.
    pub fn send_error(&self) -> &str {
        &self.send_error
    }

    /// When the last record was decoded.
    pub fn last_heard(&self) -> Option<Instant> {
        self.last_heard
    }

    /// Time (ms) of the last round trip the layer above saw succeed.
    pub fn last_roundtrip_success(&self) -> u64 {
        self.last_roundtrip_success
    }

    /// Store the time (ms) of the last successful round trip.
    pub fn set_last_roundtrip_success(&mut self, timestamp_ms: u64) {
        self.last_roundtrip_success = timestamp_ms;
    }

    /// Descriptors the caller should poll.
    #[cfg(unix)]
    pub fn raw_fds(&self) -> Vec<std::os::fd::RawFd> {
        self.link.raw_fds()
    }

    /// The cipher.
    pub fn cipher(&self) -> &C {
        &self.cipher
    }

    /// Shut down and release the socket. Idempotent; a closed client does
    /// not reconnect.
    pub fn close(&mut self) {
        self.link.close();
    }
}

impl<C: Cipher> Connection for TcpConnection<C> {
    fn send(&mut self, payload: &[u8]) -> impl Future<Output = TransportResult<SendOutcome>> + Send {
        TcpConnection::send(self, payload)
    }

    fn receive(&mut self) -> impl Future<Output = TransportResult<Received>> + Send {
        TcpConnection::receive(self)
    }

    fn timeout(&self) -> Duration {
        TcpConnection::timeout(self)
    }

    fn mtu(&self) -> usize {
        DEFAULT_TCP_MTU
    }

    fn local_port(&self) -> Option<u16> {
        TcpConnection::local_port(self)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        TcpConnection::remote_addr(self)
    }

    fn srtt(&self) -> f64 {
        TcpConnection::srtt(self)
    }

    fn set_last_roundtrip_success(&mut self, timestamp_ms: u64) {
        TcpConnection::set_last_roundtrip_success(self, timestamp_ms);
    }

    fn send_error(&self) -> &str {
        TcpConnection::send_error(self)
    }

    #[cfg(unix)]
    fn raw_fds(&self) -> Vec<std::os::fd::RawFd> {
        TcpConnection::raw_fds(self)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    use super::*;
    use crate::core::{CryptoError, MAX_IO_TIMEOUT, MIN_IO_TIMEOUT};
    use crate::transport::{PortRange, encode_frame};

    /// XOR "cipher" with a one-byte tag, enough to exercise the pipeline.
    #[derive(Debug, Clone)]
    struct XorCipher(u8);

    impl Cipher for XorCipher {
        fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
            let mut out: Vec<u8> = plaintext.iter().map(|b| b ^ self.0).collect();
            out.push(self.0);
            Ok(out)
        }

        fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
            match ciphertext.split_last() {
                Some((&tag, body)) if tag == self.0 => Ok(body.iter().map(|b| b ^ self.0).collect()),
                _ => Err(CryptoError::DecryptionFailed),
            }
        }
    }

    async fn server() -> TcpConnection<XorCipher> {
        let config =
            ServerConfig::new(Some("127.0.0.1"), PortRange::single(0)).io_timeout(MIN_IO_TIMEOUT);
        TcpConnection::server(config, XorCipher(0x5a)).await.unwrap()
    }

    async fn pair() -> (TcpConnection<XorCipher>, TcpConnection<XorCipher>) {
        let server = server().await;
        let config = ClientConfig::new("127.0.0.1", server.local_port().unwrap())
            .io_timeout(MIN_IO_TIMEOUT);
        let client = TcpConnection::client(config, XorCipher(0x5a)).await.unwrap();
        (server, client)
    }

    async fn receive_payload(conn: &mut TcpConnection<XorCipher>) -> Vec<u8> {
        for _ in 0..20 {
            if let Received::Payload(p) = conn.receive().await.unwrap() {
                return p;
            }
        }
        panic!("no payload");
    }

    #[tokio::test]
    async fn test_describe_before_peer() {
        let server = server().await;
        assert_eq!(server.role(), Role::Server);
        assert!(!server.has_remote_addr());
        assert_eq!(server.remote_addr_len(), 0);
        assert_eq!(server.srtt(), 1000.0);
        assert_eq!(server.timeout(), MAX_IO_TIMEOUT);
        assert_eq!(server.mtu(), DEFAULT_TCP_MTU);
        assert_eq!(server.port(), server.local_port().unwrap().to_string());
        assert!(server.send_error().is_empty());
        assert!(server.last_heard().is_none());
    }

    #[tokio::test]
    async fn test_server_send_without_peer() {
        let mut server = server().await;
        assert_eq!(server.send(b"early").await.unwrap(), SendOutcome::NotConnected);
        assert_eq!(server.send_error(), "not connected");
        assert_eq!(server.phase(), Phase::Listening);
    }

    #[tokio::test]
    async fn test_server_receive_without_peer() {
        let mut server = server().await;
        assert_eq!(server.receive().await.unwrap(), Received::NoDataYet);
    }

    #[tokio::test]
    async fn test_exchange_and_echo() {
        let (mut server, mut client) = pair().await;

        assert_eq!(client.send(b"hello").await.unwrap(), SendOutcome::Sent);
        assert_eq!(receive_payload(&mut server).await, b"hello");
        assert!(server.has_remote_addr());
        assert!(server.remote_addr_len() > 0);
        assert!(server.last_heard().is_some());

        // The reply echoes the client's stamp, giving the client a sample.
        assert_eq!(server.send(b"world").await.unwrap(), SendOutcome::Sent);
        assert_eq!(receive_payload(&mut client).await, b"world");
        assert!(client.rtt().has_sample());
        assert!(client.srtt() < 1000.0);
    }

    #[tokio::test]
    async fn test_oversize_payload_rejected_before_write() {
        let (mut server, mut client) = pair().await;
        let payload = vec![0u8; crate::core::MAX_FRAME_SIZE];
        assert!(matches!(
            client.send(&payload).await,
            Err(TransportError::Frame(_))
        ));
        // Stream untouched.
        assert_eq!(client.phase(), Phase::Connected);
        assert_eq!(client.send(b"after").await.unwrap(), SendOutcome::Sent);
        assert_eq!(receive_payload(&mut server).await, b"after");
    }

    #[tokio::test]
    async fn test_reflected_record_rejected() {
        let mut server = server().await;
        let port = server.local_port().unwrap();
        let mut raw = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

        // A record stamped as if it came from the server itself.
        let record = Record::new(Direction::ToClient, 1, None, b"echo".to_vec());
        let ciphertext = XorCipher(0x5a).encrypt(&record.to_bytes()).unwrap();
        raw.write_all(&encode_frame(&ciphertext).unwrap()).await.unwrap();

        let mut result = server.receive().await;
        while matches!(result, Ok(Received::NoDataYet)) {
            result = server.receive().await;
        }
        assert!(matches!(result, Err(TransportError::UnexpectedDirection)));
        assert_eq!(server.phase(), Phase::Disconnected);
        assert!(matches!(
            server.receive().await,
            Err(TransportError::ConnectionClosed)
        ));
        assert_eq!(server.send(b"x").await.unwrap(), SendOutcome::NotConnected);
    }

    #[tokio::test]
    async fn test_client_absorbs_peer_loss() {
        let (mut server, mut client) = pair().await;
        client.send(b"hi").await.unwrap();
        receive_payload(&mut server).await;
        drop(server);

        assert_eq!(client.receive().await.unwrap(), Received::NoDataYet);
        assert_eq!(client.phase(), Phase::Reconnecting);
        assert_eq!(client.send(b"lost").await.unwrap(), SendOutcome::Dropped);
        assert!(!client.send_error().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_send_tears_down_client() {
        let (_server, mut client) = pair().await;
        let payload = vec![0u8; crate::core::MAX_FRAME_SIZE - 64];

        // The server never reads, so eventually a send stalls mid-frame.
        let mut cancelled = false;
        for _ in 0..64 {
            let send = client.send(&payload);
            if tokio::time::timeout(Duration::from_millis(20), send).await.is_err() {
                cancelled = true;
                break;
            }
        }
        assert!(cancelled, "socket buffers never filled");

        assert_eq!(client.send(b"next").await.unwrap(), SendOutcome::Dropped);
        assert_eq!(client.phase(), Phase::Reconnecting);
        assert!(!client.send_error().is_empty());
    }

    #[tokio::test]
    async fn test_last_roundtrip_success() {
        let mut server = server().await;
        server.set_last_roundtrip_success(42);
        assert_eq!(server.last_roundtrip_success(), 42);
    }

    #[tokio::test]
    async fn test_closed_client_reports_not_connected() {
        let (_server, mut client) = pair().await;
        client.close();
        client.close();
        assert_eq!(client.send(b"x").await.unwrap(), SendOutcome::NotConnected);
        assert!(matches!(
            client.receive().await,
            Err(TransportError::NotConnected)
        ));
    }
}
