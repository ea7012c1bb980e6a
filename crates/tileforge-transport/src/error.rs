/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the UDP socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Sending a datagram failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a datagram failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The socket's local address could not be read.
    #[error("local address unavailable: {0}")]
    AddrUnavailable(#[source] std::io::Error),
}

/// Reasons an envelope is rejected by the [`SecureChannel`](crate::SecureChannel).
///
/// Every variant except [`InvalidKey`](Self::InvalidKey) is raised before
/// any decryption happens. None of them are ever reported to the sender.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The datagram does not start with `SEC1|`.
    #[error("missing envelope prefix")]
    MissingPrefix,

    /// The body after the prefix is not valid base64.
    #[error("envelope body is not valid base64")]
    BadBase64,

    /// The decoded frame is shorter than version + nonce + MAC.
    #[error("envelope too short: {len} bytes")]
    TooShort { len: usize },

    /// The version byte is not one this server speaks.
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),

    /// The MAC did not verify.
    #[error("envelope MAC mismatch")]
    MacMismatch,

    /// The configured shared key is unusable. Fatal at startup.
    #[error("invalid shared key: {0}")]
    InvalidKey(String),
}
