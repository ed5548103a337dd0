//! UDP transport for DNS queries.
//!
//! One task owns the receive loop. Every datagram is copied out of the
//! receive buffer and handed to its own task, which resolves it and sends
//! the reply through the shared socket. The loop never waits on a request.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::forward::Forwarder;
use crate::resolver::Resolver;

use super::MAX_DNS_PACKET_SIZE;

/// UDP transport for the relay.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop.
    ///
    /// The returned handle only completes if the task is aborted.
    pub fn start<F: Forwarder>(self, resolver: Arc<Resolver<F>>) -> JoinHandle<()> {
        tokio::spawn(run(self.socket, resolver))
    }
}

/// Receive loop: spawn a worker per datagram.
async fn run<F: Forwarder>(socket: Arc<UdpSocket>, resolver: Arc<Resolver<F>>) {
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!("UDP recv error: {}", e);
                continue;
            }
        };

        trace!(%src, len, "datagram received");
        let packet = buf[..len].to_vec();
        tokio::spawn(handle_query(socket.clone(), resolver.clone(), packet, src));
    }
}

/// Resolve one query and send the reply, if any, back to `src`.
async fn handle_query<F: Forwarder>(
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver<F>>,
    packet: Vec<u8>,
    src: SocketAddr,
) {
    let Some(response) = resolver.resolve(&packet).await else {
        return;
    };

    if let Err(e) = socket.send_to(&response, src).await {
        warn!(%src, "UDP response error: {}", e);
    }
}
