//! The world model for Tileforge.
//!
//! The world is five parallel layers over the same chunk grid:
//!
//! - **Tiles**: a dense 100×100 grid of terrain ids per chunk
//! - **Objects**, **Resources**, **Blocking**, **Surfaces**: sparse
//!   entries, at most one per coordinate
//!
//! Every chunk carries a version that increases by one per applied
//! change. Clients cache chunks by version and only re-fetch when the
//! server has something newer.
//!
//! # Key types
//!
//! - [`World`]: the five layers, edit application and flush snapshots
//! - [`LayerStore`]: one layer's chunks, generic over [`ChunkData`]
//! - [`Catalogs`]: read-only type definitions used to validate edits
//! - [`load_world`] / [`write_chunks`]: chunk files on disk

mod catalog;
mod chunk;
mod error;
mod persist;
mod store;
mod world;

pub use catalog::{BlockingDef, Catalogs, ObjectDef, ResourceDef, SurfaceDef, type_key};
pub use chunk::{Chunk, ChunkData, EntityChunk, LayerEntry, Resolved, TILES_PER_CHUNK, TileChunk};
pub use error::WorldError;
pub use persist::{load_world, write_atomic, write_chunks};
pub use store::LayerStore;
pub use world::{DirtyChunk, World};
