//! Error types for the protocol layer.
//!
//! A `ProtocolError` means the plaintext inside a valid envelope could not
//! be understood: a JSON body failed to (de)serialize, or a command was
//! recognised by its prefix but its fields were malformed.

use crate::CommandKind;

/// Errors that can occur while parsing commands or coding JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into JSON).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning JSON into a Rust value).
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A command matched a prefix but its fields were unusable.
    ///
    /// `kind` decides which error code the client sees, if any.
    #[error("malformed {kind} command: {reason}")]
    Malformed { kind: CommandKind, reason: String },
}

impl ProtocolError {
    /// Shorthand for a [`ProtocolError::Malformed`].
    pub fn malformed(kind: CommandKind, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            reason: reason.into(),
        }
    }

    /// Wire error code for the client, e.g. `bad_chunk`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed { kind, .. } => kind.error_code(),
            Self::Encode(_) | Self::Decode(_) => "bad_payload",
        }
    }

    /// Whether the client should get an `ERR|<code>` reply.
    ///
    /// Malformed edits and position updates are only logged.
    pub fn replies(&self) -> bool {
        match self {
            Self::Malformed { kind, .. } => kind.replies_on_error(),
            Self::Encode(_) | Self::Decode(_) => false,
        }
    }
}
