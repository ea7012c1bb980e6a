//! A single layer: chunks keyed by chunk id, created on first touch.

use std::collections::BTreeMap;

use tileforge_protocol::{ChunkId, Layer};

use crate::{Catalogs, Chunk, ChunkData};

/// All chunks of one layer.
///
/// Chunks are never removed. Reading a chunk that doesn't exist creates
/// an empty, clean one.
#[derive(Debug)]
pub struct LayerStore<C> {
    chunks: BTreeMap<ChunkId, Chunk<C>>,
}

impl<C: ChunkData> Default for LayerStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ChunkData> LayerStore<C> {
    pub fn new() -> Self {
        Self {
            chunks: BTreeMap::new(),
        }
    }

    pub fn layer(&self) -> Layer {
        C::LAYER
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk<C>> {
        self.chunks.get(&id)
    }

    /// Returns the chunk, creating an empty one if needed.
    pub fn get_or_create(&mut self, id: ChunkId) -> &mut Chunk<C> {
        self.chunks.entry(id).or_insert_with(Chunk::empty)
    }

    /// The chunk's payload if the client is behind, `None` if it is
    /// up to date.
    ///
    /// A negative `last_known_version` always gets the payload.
    pub fn request_sync(&mut self, id: ChunkId, last_known_version: i64) -> Option<C::Payload> {
        let chunk = self.get_or_create(id);
        let newer = last_known_version < 0
            || i64::try_from(chunk.version).map_or(true, |v| v > last_known_version);
        newer.then(|| chunk.data.to_payload(id, chunk.version))
    }

    /// Applies each change to the chunk containing it. Returns how many
    /// were applied; skipped changes leave no trace besides the count.
    pub fn apply_edits(&mut self, changes: &[C::Change], catalogs: &Catalogs) -> usize {
        let mut applied = 0;
        for change in changes {
            let (x, y) = C::change_position(change);
            let id = ChunkId::containing(x, y);
            let chunk = self.get_or_create(id);
            if chunk.data.apply(id, change, catalogs) {
                chunk.version += 1;
                chunk.dirty = true;
                applied += 1;
            }
        }
        applied
    }

    /// Payload and version of every dirty chunk, as of now.
    pub fn dirty_snapshot(&self) -> Vec<(ChunkId, u64, C::Payload)> {
        self.chunks
            .iter()
            .filter(|(_, chunk)| chunk.dirty)
            .map(|(id, chunk)| (*id, chunk.version, chunk.data.to_payload(*id, chunk.version)))
            .collect()
    }

    /// Clears the dirty flag if the chunk is still at `version`.
    ///
    /// Returns `false` when the chunk moved on during the write and must
    /// be flushed again.
    pub fn mark_flushed(&mut self, id: ChunkId, version: u64) -> bool {
        match self.chunks.get_mut(&id) {
            Some(chunk) if chunk.version == version => {
                chunk.dirty = false;
                true
            }
            _ => false,
        }
    }

    /// Installs a chunk read from disk. Loaded chunks start clean.
    pub fn insert_loaded(&mut self, id: ChunkId, payload: C::Payload) {
        let (data, version) = C::from_payload(payload);
        self.chunks.insert(
            id,
            Chunk {
                version,
                dirty: false,
                data,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dirty_count(&self) -> usize {
        self.chunks.values().filter(|c| c.dirty).count()
    }
}
