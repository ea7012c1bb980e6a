//! The five layers together.

use tileforge_protocol::{
    BlockingEntry, ChunkId, Codec, EditBatch, JsonCodec, Layer, ObjectEntry, ProtocolError,
    ResourceEntry, SurfaceEntry,
};

use crate::{Catalogs, ChunkData, EntityChunk, LayerStore, TileChunk, WorldError};

/// A dirty chunk, serialized and ready to be written outside the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct DirtyChunk {
    pub layer: Layer,
    pub id: ChunkId,
    /// Version at snapshot time, handed back to [`World::mark_flushed`].
    pub version: u64,
    pub body: String,
}

/// Tiles, objects, resources, blocking cells and surfaces.
#[derive(Debug, Default)]
pub struct World {
    tiles: LayerStore<TileChunk>,
    objects: LayerStore<EntityChunk<ObjectEntry>>,
    resources: LayerStore<EntityChunk<ResourceEntry>>,
    blocking: LayerStore<EntityChunk<BlockingEntry>>,
    surfaces: LayerStore<EntityChunk<SurfaceEntry>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tiles(&self) -> &LayerStore<TileChunk> {
        &self.tiles
    }

    pub fn objects(&self) -> &LayerStore<EntityChunk<ObjectEntry>> {
        &self.objects
    }

    pub fn resources(&self) -> &LayerStore<EntityChunk<ResourceEntry>> {
        &self.resources
    }

    pub fn blocking(&self) -> &LayerStore<EntityChunk<BlockingEntry>> {
        &self.blocking
    }

    pub fn surfaces(&self) -> &LayerStore<EntityChunk<SurfaceEntry>> {
        &self.surfaces
    }

    /// JSON snapshot of a chunk if the client is behind.
    ///
    /// # Errors
    /// Only if the payload fails to serialize.
    pub fn request_chunk(
        &mut self,
        layer: Layer,
        id: ChunkId,
        last_known_version: i64,
    ) -> Result<Option<String>, WorldError> {
        fn sync<C: ChunkData>(
            store: &mut LayerStore<C>,
            id: ChunkId,
            last_known_version: i64,
        ) -> Result<Option<String>, ProtocolError> {
            store
                .request_sync(id, last_known_version)
                .map(|payload| JsonCodec.encode(&payload))
                .transpose()
        }

        let body = match layer {
            Layer::Tiles => sync(&mut self.tiles, id, last_known_version),
            Layer::Objects => sync(&mut self.objects, id, last_known_version),
            Layer::Resources => sync(&mut self.resources, id, last_known_version),
            Layer::Blocking => sync(&mut self.blocking, id, last_known_version),
            Layer::Surfaces => sync(&mut self.surfaces, id, last_known_version),
        }?;
        Ok(body)
    }

    /// Applies an edit batch to its layer. Returns the applied count.
    pub fn apply(&mut self, batch: &EditBatch, catalogs: &Catalogs) -> usize {
        match batch {
            EditBatch::Tiles(changes) => self.tiles.apply_edits(changes, catalogs),
            EditBatch::Objects(changes) => self.objects.apply_edits(changes, catalogs),
            EditBatch::Resources(changes) => self.resources.apply_edits(changes, catalogs),
            EditBatch::Blocking(changes) => self.blocking.apply_edits(changes, catalogs),
            EditBatch::Surfaces(changes) => self.surfaces.apply_edits(changes, catalogs),
        }
    }

    /// Serializes every dirty chunk on every layer.
    ///
    /// Dirty flags are left alone; call [`World::mark_flushed`] for each
    /// chunk once its file is written.
    pub fn flush_snapshot(&self) -> Vec<DirtyChunk> {
        fn collect<C: ChunkData>(store: &LayerStore<C>, out: &mut Vec<DirtyChunk>) {
            for (id, version, payload) in store.dirty_snapshot() {
                match JsonCodec.encode(&payload) {
                    Ok(body) => out.push(DirtyChunk {
                        layer: C::LAYER,
                        id,
                        version,
                        body,
                    }),
                    Err(e) => {
                        tracing::warn!(layer = %C::LAYER, chunk = %id, error = %e, "chunk encode failed");
                    }
                }
            }
        }

        let mut out = Vec::new();
        collect(&self.tiles, &mut out);
        collect(&self.objects, &mut out);
        collect(&self.resources, &mut out);
        collect(&self.blocking, &mut out);
        collect(&self.surfaces, &mut out);
        out
    }

    /// Clears a chunk's dirty flag unless it changed after `version`.
    pub fn mark_flushed(&mut self, layer: Layer, id: ChunkId, version: u64) -> bool {
        match layer {
            Layer::Tiles => self.tiles.mark_flushed(id, version),
            Layer::Objects => self.objects.mark_flushed(id, version),
            Layer::Resources => self.resources.mark_flushed(id, version),
            Layer::Blocking => self.blocking.mark_flushed(id, version),
            Layer::Surfaces => self.surfaces.mark_flushed(id, version),
        }
    }

    /// Installs a chunk file's contents.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] when `text` is not a valid payload for
    /// the layer.
    pub fn load_chunk(&mut self, layer: Layer, id: ChunkId, text: &str) -> Result<(), ProtocolError> {
        fn install<C: ChunkData>(
            store: &mut LayerStore<C>,
            id: ChunkId,
            text: &str,
        ) -> Result<(), ProtocolError> {
            let payload: C::Payload = JsonCodec.decode(text)?;
            store.insert_loaded(id, payload);
            Ok(())
        }

        match layer {
            Layer::Tiles => install(&mut self.tiles, id, text),
            Layer::Objects => install(&mut self.objects, id, text),
            Layer::Resources => install(&mut self.resources, id, text),
            Layer::Blocking => install(&mut self.blocking, id, text),
            Layer::Surfaces => install(&mut self.surfaces, id, text),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.tiles.len()
            + self.objects.len()
            + self.resources.len()
            + self.blocking.len()
            + self.surfaces.len()
    }

    pub fn dirty_count(&self) -> usize {
        self.tiles.dirty_count()
            + self.objects.dirty_count()
            + self.resources.dirty_count()
            + self.blocking.dirty_count()
            + self.surfaces.dirty_count()
    }
}
