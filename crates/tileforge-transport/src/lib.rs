//! Transport layer for Tileforge.
//!
//! Everything between the raw socket and the plaintext command grammar:
//!
//! - [`DatagramTransport`] / [`UdpTransport`] — best-effort datagram I/O
//! - [`SecureChannel`] — the `SEC1|` authenticated-encryption envelope
//! - [`RateLimiter`] — per-endpoint token-bucket admission
//!
//! # How it fits in the stack
//!
//! ```text
//! socket bytes → SecureChannel::open → RateLimiter::check → protocol parse
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod rate_limit;
mod secure;
mod udp;

pub use error::{ChannelError, TransportError};
pub use rate_limit::{Admission, RateLimitConfig, RateLimiter};
pub use secure::{
    ENVELOPE_PREFIX, ENVELOPE_VERSION, KEY_LEN, MAC_LEN, MIN_ENVELOPE_LEN, NONCE_LEN,
    SecureChannel,
};
pub use udp::UdpTransport;

use std::net::SocketAddr;

/// Largest datagram the server will read in one receive.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// Unreliable, unordered datagram I/O.
///
/// One socket serves every client; the peer address travels with each
/// datagram instead of living in a connection object.
pub trait DatagramTransport: Send + Sync + 'static {
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next datagram. Returns its length and sender.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), Self::Error>;

    /// Sends one datagram to `target`.
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<(), Self::Error>;

    /// The address the transport is bound to.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}
