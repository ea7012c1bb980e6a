//! Unified error type for the Tileforge server.

use tileforge_protocol::ProtocolError;
use tileforge_session::SessionError;
use tileforge_transport::{ChannelError, TransportError};
use tileforge_world::WorldError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically. Only startup failures (bad key, socket bind,
/// unusable data directory) ever reach `main`; everything that happens
/// per datagram is logged and dropped inside the loop.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Socket bind, send or receive failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Envelope failure, or an unusable shared key at startup.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Reading or writing chunk, account or player files.
    #[error(transparent)]
    World(#[from] WorldError),

    /// The data directory could not be created.
    #[error("data directory unavailable: {0}")]
    DataDir(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_channel_error_wraps_transparently() {
        let err: ForgeError = ChannelError::InvalidKey("31 bytes".into()).into();
        assert!(matches!(err, ForgeError::Channel(_)));
        assert!(err.to_string().contains("31 bytes"));
    }

    #[test]
    fn test_from_session_error_keeps_message() {
        let err: ForgeError = SessionError::NotFound("alice".into()).into();
        assert!(matches!(err, ForgeError::Session(_)));
        assert!(err.to_string().contains("alice"));
    }

    #[test]
    fn test_from_transport_error_wraps() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: ForgeError = TransportError::BindFailed(io).into();
        assert!(matches!(err, ForgeError::Transport(_)));
        assert!(err.to_string().contains("in use"));
    }

    #[test]
    fn test_from_protocol_error_wraps() {
        let err: ForgeError = ProtocolError::malformed(
            tileforge_protocol::CommandKind::Login,
            "missing password",
        )
        .into();
        assert!(matches!(err, ForgeError::Protocol(_)));
    }
}
