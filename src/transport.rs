//! Datagram transport.
//!
//! A [`Transport`] performs exactly one request/response exchange with one
//! server. It never retransmits: when a server does not answer within the
//! timeout, the resolver simply moves on to the next candidate.
//!
//! [`UdpTransport`] is the production implementation. It sends over a fresh
//! UDP socket bound to an ephemeral port, and waits for a reply from the
//! queried address that carries the same transaction id.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::dns::HEADER_LEN;

/// DNS messages over UDP are limited to 512 bytes without EDNS(0) (RFC 1035).
pub const MAX_UDP_RESPONSE_SIZE: usize = 512;

/// A failed exchange with a single server.
///
/// Every variant is recoverable from the resolver's point of view: it tries
/// the next candidate server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out waiting for {server}")]
    Timeout { server: Ipv4Addr },

    #[error("I/O error talking to {server}: {source}")]
    Io {
        server: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    /// The query itself was too short to carry a transaction id.
    #[error("refusing to send a malformed query to {server}")]
    Malformed { server: Ipv4Addr },
}

/// One blocking query/response exchange with a name server.
pub trait Transport {
    /// Sends `query` to `server` and returns the raw response bytes.
    fn exchange(&self, server: Ipv4Addr, query: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn exchange(&self, server: Ipv4Addr, query: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).exchange(server, query)
    }
}

/// DNS over UDP.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    port: u16,
    timeout: Duration,
}

impl UdpTransport {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.port, config.timeout())
    }

    fn io_error(server: Ipv4Addr) -> impl FnOnce(io::Error) -> TransportError {
        move |source| TransportError::Io { server, source }
    }
}

impl Transport for UdpTransport {
    fn exchange(&self, server: Ipv4Addr, query: &[u8]) -> Result<Vec<u8>, TransportError> {
        if query.len() < HEADER_LEN {
            return Err(TransportError::Malformed { server });
        }
        let query_id = [query[0], query[1]];
        let server_addr = SocketAddr::V4(SocketAddrV4::new(server, self.port));

        // Bind to an ephemeral port chosen by the operating system.
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(Self::io_error(server))?;

        let bytes_sent = socket
            .send_to(query, server_addr)
            .map_err(Self::io_error(server))?;
        debug!(server = %server_addr, bytes_sent, "UDP query sent");

        // One deadline covers the whole exchange, stray datagrams included.
        let deadline = Instant::now() + self.timeout;
        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout { server });
            }
            socket
                .set_read_timeout(Some(remaining))
                .map_err(Self::io_error(server))?;

            let (bytes_received, from_addr) = match socket.recv_from(&mut recv_buf) {
                Ok(received) => received,
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Err(TransportError::Timeout { server });
                }
                Err(e) => return Err(TransportError::Io { server, source: e }),
            };

            if from_addr != server_addr {
                warn!(
                    expected = %server_addr,
                    received_from = %from_addr,
                    "UDP response from unexpected source"
                );
                continue;
            }
            if bytes_received < 2 || recv_buf[..2] != query_id {
                warn!(server = %server_addr, bytes_received, "UDP response with mismatched id");
                continue;
            }

            debug!(server = %server_addr, bytes_received, "UDP response received");
            recv_buf.truncate(bytes_received);
            return Ok(recv_buf);
        }
    }
}
