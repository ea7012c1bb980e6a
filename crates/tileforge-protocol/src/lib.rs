//! Wire protocol for Tileforge.
//!
//! This crate defines the plaintext language spoken inside the encrypted
//! envelope:
//!
//! - **Commands** ([`Command`], [`parse_command`]) — the pipe-delimited
//!   grammar clients send, dispatched by prefix.
//! - **Replies** ([`Reply`], [`render_broadcast`]) — what the server sends
//!   back, including the line-oriented position broadcast.
//! - **Types** ([`ChunkId`], [`Layer`], entries, changes, chunk payloads) —
//!   the JSON shapes shared by the wire and the on-disk chunk files.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — how JSON bodies are produced
//!   and parsed.
//!
//! # Architecture
//!
//! ```text
//! Transport (envelope) → Protocol (Command) → Session / World (apply)
//! ```

mod codec;
mod command;
mod error;
mod reply;
mod types;

pub use codec::{Codec, JsonCodec};
pub use command::{Command, CommandKind, EditBatch, PositionUpdate, parse_command};
pub use error::ProtocolError;
pub use reply::{PlayerSnapshot, Reply, format_coord, render_broadcast};
pub use types::{
    BlockingChange, BlockingChunkPayload, BlockingEntry, CHUNK_SIZE, ChunkId, EditBody, Layer,
    LOGIN_SENTINEL_ID, ObjectChange, ObjectChunkPayload, ObjectEntry, REMOVE_TYPE_ID,
    ResourceChange, ResourceChunkPayload, ResourceEntry, SURFACE_REMOVE_ID, SurfaceChange,
    SurfaceChunkPayload, SurfaceEntry, TileChange, TileChunkPayload, floor_div,
};
