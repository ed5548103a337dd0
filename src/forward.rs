//! Upstream forwarding.
//!
//! Each forwarded query gets its own ephemeral socket, so a reply can only
//! come back to the request that caused it. One attempt, bounded wait.

use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::error::ForwardError;
use crate::transport::MAX_DNS_PACKET_SIZE;

/// Port upstream resolvers are contacted on.
pub const UPSTREAM_PORT: u16 = 53;

/// How long to wait for the upstream reply.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends a raw query somewhere and returns the raw reply.
pub trait Forwarder: Send + Sync + 'static {
    fn forward(&self, query: &[u8]) -> impl Future<Output = Result<Vec<u8>, ForwardError>> + Send;
}

/// Forwards queries to a single upstream resolver over UDP.
///
/// The per-call socket is connected to `upstream`, so replies arriving from
/// any other address (a multi-homed or NATed resolver answering from a
/// different IP) are discarded and the call ends in a timeout.
#[derive(Debug, Clone)]
pub struct UdpForwarder {
    upstream: SocketAddr,
    timeout: Duration,
}

impl UdpForwarder {
    pub fn new(upstream: SocketAddr) -> Self {
        Self {
            upstream,
            timeout: UPSTREAM_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    fn local_bind_addr(&self) -> SocketAddr {
        match self.upstream {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        }
    }
}

impl Forwarder for UdpForwarder {
    async fn forward(&self, query: &[u8]) -> Result<Vec<u8>, ForwardError> {
        let socket = UdpSocket::bind(self.local_bind_addr()).await?;
        socket.connect(self.upstream).await?;
        socket.send(query).await?;

        let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
        let len = timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| ForwardError::Timeout(self.timeout))??;

        buf.truncate(len);
        Ok(buf)
    }
}
