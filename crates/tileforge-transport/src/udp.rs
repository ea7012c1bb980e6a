//! UDP transport implementation using `tokio::net::UdpSocket`.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::{DatagramTransport, TransportError};

/// A [`DatagramTransport`] over a single bound UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds a new UDP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(addr, "UDP transport listening");
        Ok(Self { socket })
    }
}

impl DatagramTransport for UdpTransport {
    type Error = TransportError;

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), Self::Error> {
        self.socket
            .recv_from(buf)
            .await
            .map_err(TransportError::ReceiveFailed)
    }

    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<(), Self::Error> {
        let sent = self
            .socket
            .send_to(data, target)
            .await
            .map_err(TransportError::SendFailed)?;
        if sent < data.len() {
            tracing::debug!(%target, sent, len = data.len(), "datagram truncated on send");
        }
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.socket
            .local_addr()
            .map_err(TransportError::AddrUnavailable)
    }
}
