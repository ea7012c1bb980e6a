//! Chunk contents for the dense and sparse layers.
//!
//! Each layer is a map of [`Chunk`]s. What a chunk holds, how an edit
//! lands in it, and what it looks like on the wire is described by the
//! [`ChunkData`] trait. The dense tile grid implements it directly; the
//! four sparse layers share [`EntityChunk`] and differ only in their
//! [`LayerEntry`] type.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tileforge_protocol::{
    BlockingChange, BlockingChunkPayload, BlockingEntry, CHUNK_SIZE, ChunkId, Layer, ObjectChange,
    ObjectChunkPayload, ObjectEntry, REMOVE_TYPE_ID, ResourceChange, ResourceChunkPayload,
    ResourceEntry, SURFACE_REMOVE_ID, SurfaceChange, SurfaceChunkPayload, SurfaceEntry,
    TileChange, TileChunkPayload,
};

use crate::Catalogs;

/// Number of tiles in a dense chunk.
pub const TILES_PER_CHUNK: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;

/// One chunk of one layer: its contents plus sync/persistence bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<D> {
    /// Bumped once per applied change. Never decreases.
    pub version: u64,
    /// Changed since the last successful write.
    pub dirty: bool,
    pub data: D,
}

impl<D: ChunkData> Chunk<D> {
    pub fn empty() -> Self {
        Self {
            version: 0,
            dirty: false,
            data: D::empty(),
        }
    }
}

/// Layer-specific chunk behaviour.
pub trait ChunkData: Sized {
    /// One edit to this layer.
    type Change;

    /// Wire and file form of a chunk.
    type Payload: Serialize + DeserializeOwned;

    const LAYER: Layer;

    fn empty() -> Self;

    /// World coordinates an edit touches.
    fn change_position(change: &Self::Change) -> (i32, i32);

    /// Applies one edit to the chunk `id`. Returns `false` when the edit
    /// was skipped.
    fn apply(&mut self, id: ChunkId, change: &Self::Change, catalogs: &Catalogs) -> bool;

    fn to_payload(&self, id: ChunkId, version: u64) -> Self::Payload;

    /// Rebuilds chunk contents from a payload, repairing what it can.
    /// Returns the contents and the stored version.
    fn from_payload(payload: Self::Payload) -> (Self, u64);
}

// ---------------------------------------------------------------------------
// Dense tiles
// ---------------------------------------------------------------------------

/// Terrain grid, row-major: `tiles[ly * CHUNK_SIZE + lx]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileChunk {
    tiles: Vec<i32>,
}

impl TileChunk {
    pub fn tiles(&self) -> &[i32] {
        &self.tiles
    }

    /// Tile at a local offset, or `None` outside the chunk.
    pub fn get(&self, lx: i32, ly: i32) -> Option<i32> {
        local_index(lx, ly).map(|i| self.tiles[i])
    }
}

fn local_index(lx: i32, ly: i32) -> Option<usize> {
    if (0..CHUNK_SIZE).contains(&lx) && (0..CHUNK_SIZE).contains(&ly) {
        Some((ly * CHUNK_SIZE + lx) as usize)
    } else {
        None
    }
}

impl ChunkData for TileChunk {
    type Change = TileChange;
    type Payload = TileChunkPayload;
    const LAYER: Layer = Layer::Tiles;

    fn empty() -> Self {
        Self {
            tiles: vec![0; TILES_PER_CHUNK],
        }
    }

    fn change_position(change: &TileChange) -> (i32, i32) {
        (change.x, change.y)
    }

    fn apply(&mut self, id: ChunkId, change: &TileChange, _catalogs: &Catalogs) -> bool {
        let (lx, ly) = id.local_offset(change.x, change.y);
        match local_index(lx, ly) {
            Some(i) => {
                self.tiles[i] = change.tile;
                true
            }
            None => false,
        }
    }

    fn to_payload(&self, id: ChunkId, version: u64) -> TileChunkPayload {
        TileChunkPayload {
            x: id.cx,
            y: id.cy,
            size: CHUNK_SIZE,
            version,
            tiles: Some(self.tiles.clone()),
        }
    }

    fn from_payload(payload: TileChunkPayload) -> (Self, u64) {
        let loaded = payload.tiles.unwrap_or_default();
        if loaded.len() == TILES_PER_CHUNK {
            return (Self { tiles: loaded }, payload.version);
        }

        tracing::warn!(
            cx = payload.x,
            cy = payload.y,
            found = loaded.len(),
            expected = TILES_PER_CHUNK,
            "repairing tile chunk with wrong length"
        );
        let mut tiles = vec![0; TILES_PER_CHUNK];
        let keep = loaded.len().min(TILES_PER_CHUNK);
        tiles[..keep].copy_from_slice(&loaded[..keep]);
        (Self { tiles }, payload.version)
    }
}

// ---------------------------------------------------------------------------
// Sparse entries
// ---------------------------------------------------------------------------

/// How a sparse edit resolves against the catalogs.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<E> {
    /// Put this entry at its coordinate, replacing any occupant.
    Place(E),
    /// Clear the coordinate.
    Remove,
    /// Unknown or blank type; ignore the edit.
    Skip,
}

/// An entry type for one of the sparse layers.
pub trait LayerEntry: Clone {
    type Change;
    type Payload: Serialize + DeserializeOwned;
    const LAYER: Layer;

    fn position(&self) -> (i32, i32);
    fn change_position(change: &Self::Change) -> (i32, i32);
    fn resolve(change: &Self::Change, catalogs: &Catalogs) -> Resolved<Self>;
    fn to_payload(id: ChunkId, version: u64, entries: &[Self]) -> Self::Payload;
    fn from_payload(payload: Self::Payload) -> (Option<Vec<Self>>, u64);
}

/// Sparse chunk: at most one entry per coordinate, in placement order.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChunk<E> {
    entries: Vec<E>,
}

impl<E: LayerEntry> EntityChunk<E> {
    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    pub fn at(&self, x: i32, y: i32) -> Option<&E> {
        self.entries.iter().find(|e| e.position() == (x, y))
    }

    fn place(&mut self, entry: E) {
        let pos = entry.position();
        match self.entries.iter_mut().find(|e| e.position() == pos) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }

    fn remove(&mut self, pos: (i32, i32)) {
        self.entries.retain(|e| e.position() != pos);
    }
}

impl<E: LayerEntry> ChunkData for EntityChunk<E> {
    type Change = E::Change;
    type Payload = E::Payload;
    const LAYER: Layer = E::LAYER;

    fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn change_position(change: &E::Change) -> (i32, i32) {
        E::change_position(change)
    }

    /// Removal counts as applied even when the coordinate was empty, so
    /// the version advances once per accepted edit.
    fn apply(&mut self, _id: ChunkId, change: &E::Change, catalogs: &Catalogs) -> bool {
        match E::resolve(change, catalogs) {
            Resolved::Place(entry) => {
                self.place(entry);
                true
            }
            Resolved::Remove => {
                self.remove(E::change_position(change));
                true
            }
            Resolved::Skip => false,
        }
    }

    fn to_payload(&self, id: ChunkId, version: u64) -> E::Payload {
        E::to_payload(id, version, &self.entries)
    }

    fn from_payload(payload: E::Payload) -> (Self, u64) {
        let (loaded, version) = E::from_payload(payload);
        let mut chunk = Self::empty();
        // Later duplicates win.
        for entry in loaded.unwrap_or_default() {
            chunk.place(entry);
        }
        (chunk, version)
    }
}

fn is_removal(type_id: &str) -> bool {
    type_id.trim().eq_ignore_ascii_case(REMOVE_TYPE_ID)
}

impl LayerEntry for ObjectEntry {
    type Change = ObjectChange;
    type Payload = ObjectChunkPayload;
    const LAYER: Layer = Layer::Objects;

    fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    fn change_position(change: &ObjectChange) -> (i32, i32) {
        (change.x, change.y)
    }

    fn resolve(change: &ObjectChange, catalogs: &Catalogs) -> Resolved<Self> {
        if is_removal(&change.type_id) {
            return Resolved::Remove;
        }
        match catalogs.object(&change.type_id) {
            Some(def) => Resolved::Place(ObjectEntry {
                x: change.x,
                y: change.y,
                type_id: def.id.clone(),
                rotation: change.rotation,
                blocking: change.blocking.unwrap_or(def.blocking),
            }),
            None => Resolved::Skip,
        }
    }

    fn to_payload(id: ChunkId, version: u64, entries: &[Self]) -> ObjectChunkPayload {
        ObjectChunkPayload {
            x: id.cx,
            y: id.cy,
            version,
            objects: Some(entries.to_vec()),
        }
    }

    fn from_payload(payload: ObjectChunkPayload) -> (Option<Vec<Self>>, u64) {
        (payload.objects, payload.version)
    }
}

impl LayerEntry for ResourceEntry {
    type Change = ResourceChange;
    type Payload = ResourceChunkPayload;
    const LAYER: Layer = Layer::Resources;

    fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    fn change_position(change: &ResourceChange) -> (i32, i32) {
        (change.x, change.y)
    }

    fn resolve(change: &ResourceChange, catalogs: &Catalogs) -> Resolved<Self> {
        if is_removal(&change.type_id) {
            return Resolved::Remove;
        }
        match catalogs.resource(&change.type_id) {
            Some(def) => Resolved::Place(ResourceEntry {
                x: change.x,
                y: change.y,
                type_id: def.id.clone(),
                amount: change.amount.unwrap_or(def.default_amount),
            }),
            None => Resolved::Skip,
        }
    }

    fn to_payload(id: ChunkId, version: u64, entries: &[Self]) -> ResourceChunkPayload {
        ResourceChunkPayload {
            x: id.cx,
            y: id.cy,
            version,
            resources: Some(entries.to_vec()),
        }
    }

    fn from_payload(payload: ResourceChunkPayload) -> (Option<Vec<Self>>, u64) {
        (payload.resources, payload.version)
    }
}

impl LayerEntry for BlockingEntry {
    type Change = BlockingChange;
    type Payload = BlockingChunkPayload;
    const LAYER: Layer = Layer::Blocking;

    fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    fn change_position(change: &BlockingChange) -> (i32, i32) {
        (change.x, change.y)
    }

    fn resolve(change: &BlockingChange, catalogs: &Catalogs) -> Resolved<Self> {
        if is_removal(&change.type_id) {
            return Resolved::Remove;
        }
        match catalogs.blocking(&change.type_id) {
            Some(def) => Resolved::Place(BlockingEntry {
                x: change.x,
                y: change.y,
                type_id: def.id.clone(),
            }),
            None => Resolved::Skip,
        }
    }

    fn to_payload(id: ChunkId, version: u64, entries: &[Self]) -> BlockingChunkPayload {
        BlockingChunkPayload {
            x: id.cx,
            y: id.cy,
            version,
            blocking: Some(entries.to_vec()),
        }
    }

    fn from_payload(payload: BlockingChunkPayload) -> (Option<Vec<Self>>, u64) {
        (payload.blocking, payload.version)
    }
}

impl LayerEntry for SurfaceEntry {
    type Change = SurfaceChange;
    type Payload = SurfaceChunkPayload;
    const LAYER: Layer = Layer::Surfaces;

    fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    fn change_position(change: &SurfaceChange) -> (i32, i32) {
        (change.x, change.y)
    }

    fn resolve(change: &SurfaceChange, catalogs: &Catalogs) -> Resolved<Self> {
        if change.surface_id == SURFACE_REMOVE_ID {
            return Resolved::Remove;
        }
        match catalogs.surface(change.surface_id) {
            Some(def) => Resolved::Place(SurfaceEntry {
                x: change.x,
                y: change.y,
                surface_id: def.id,
            }),
            None => Resolved::Skip,
        }
    }

    fn to_payload(id: ChunkId, version: u64, entries: &[Self]) -> SurfaceChunkPayload {
        SurfaceChunkPayload {
            x: id.cx,
            y: id.cy,
            version,
            surfaces: Some(entries.to_vec()),
        }
    }

    fn from_payload(payload: SurfaceChunkPayload) -> (Option<Vec<Self>>, u64) {
        (payload.surfaces, payload.version)
    }
}
