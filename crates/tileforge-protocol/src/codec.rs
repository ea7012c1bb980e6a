//! Codec trait and implementations for JSON bodies.
//!
//! Chunk snapshots, edit bodies, account and player tables all go through
//! a [`Codec`], so the format lives in one place.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts between Rust values and their text form.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into text.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Serializes a value into indented text, for files meant to be read
    /// by people.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode_pretty<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Parses text back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is malformed or doesn't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use tileforge_protocol::{ChunkId, Codec, JsonCodec};
///
/// let text = JsonCodec.encode(&ChunkId::new(-1, 2)).unwrap();
/// assert_eq!(text, r#"{"cx":-1,"cy":2}"#);
/// let back: ChunkId = JsonCodec.decode(&text).unwrap();
/// assert_eq!(back, ChunkId::new(-1, 2));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn encode_pretty<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string_pretty(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EditBody, TileChange, TileChunkPayload};

    #[test]
    fn test_encode_tile_chunk_uses_wire_field_names() {
        let payload = TileChunkPayload {
            x: 0,
            y: -1,
            size: 2,
            version: 3,
            tiles: Some(vec![0, 1, 2, 3]),
        };
        assert_eq!(
            JsonCodec.encode(&payload).unwrap(),
            r#"{"x":0,"y":-1,"size":2,"version":3,"tiles":[0,1,2,3]}"#
        );
    }

    #[test]
    fn test_decode_edit_body_accepts_missing_changes() {
        let body: EditBody<TileChange> = JsonCodec.decode("{}").unwrap();
        assert!(body.changes.is_empty());
    }

    #[test]
    fn test_decode_invalid_json_is_decode_error() {
        let result: Result<EditBody<TileChange>, _> = JsonCodec.decode("{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_pretty_is_parseable() {
        let payload = TileChunkPayload {
            x: 1,
            y: 1,
            size: 1,
            version: 0,
            tiles: Some(vec![7]),
        };
        let text = JsonCodec.encode_pretty(&payload).unwrap();
        assert!(text.contains('\n'));
        let back: TileChunkPayload = JsonCodec.decode(&text).unwrap();
        assert_eq!(back, payload);
    }
}
