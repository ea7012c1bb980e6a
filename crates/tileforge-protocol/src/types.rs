//! Core wire types: chunk addressing, layers, entries, changes, payloads.
//!
//! Every JSON shape here is camelCase on the wire. The chunk payload
//! structs double as the on-disk chunk file format, so a chunk file is
//! byte-for-byte what a client would receive for that chunk.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Side length of a chunk in tiles, on every layer.
pub const CHUNK_SIZE: i32 = 100;

/// Reserved type id that deletes the entry at a coordinate.
pub const REMOVE_TYPE_ID: &str = "__remove__";

/// Surface id that deletes the surface at a coordinate.
pub const SURFACE_REMOVE_ID: i32 = 0;

/// Client id marking a player who logged in but has not moved yet.
pub const LOGIN_SENTINEL_ID: &str = "login";

/// Floor division for chunk addressing.
///
/// Rounds toward negative infinity, so `floor_div(-1, 100) == -1`
/// rather than the `0` that truncating division gives. `size` must be
/// positive.
pub fn floor_div(value: i32, size: i32) -> i32 {
    value.div_euclid(size)
}

// ---------------------------------------------------------------------------
// ChunkId
// ---------------------------------------------------------------------------

/// Integer chunk coordinates `(cx, cy)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub cx: i32,
    pub cy: i32,
}

impl ChunkId {
    pub fn new(cx: i32, cy: i32) -> Self {
        Self { cx, cy }
    }

    /// The chunk containing world tile `(x, y)`.
    pub fn containing(x: i32, y: i32) -> Self {
        Self {
            cx: floor_div(x, CHUNK_SIZE),
            cy: floor_div(y, CHUNK_SIZE),
        }
    }

    /// Offset of world tile `(x, y)` inside this chunk.
    ///
    /// Either component falls outside `0..CHUNK_SIZE` when the tile
    /// belongs to another chunk. Computed in `i64` since a chunk origin
    /// near `i32::MIN` is itself out of `i32` range.
    pub fn local_offset(&self, x: i32, y: i32) -> (i32, i32) {
        fn local(v: i32, c: i32) -> i32 {
            let offset = i64::from(v) - i64::from(c) * i64::from(CHUNK_SIZE);
            offset.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
        }
        (local(x, self.cx), local(y, self.cy))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.cx, self.cy)
    }
}

// ---------------------------------------------------------------------------
// Layer
// ---------------------------------------------------------------------------

/// One of the five parallel spatial layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Tiles,
    Objects,
    Resources,
    Blocking,
    Surfaces,
}

impl Layer {
    pub const ALL: [Layer; 5] = [
        Layer::Tiles,
        Layer::Objects,
        Layer::Resources,
        Layer::Blocking,
        Layer::Surfaces,
    ];

    /// File name prefix for this layer's chunk files.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Tiles => "chunk",
            Self::Objects => "objects",
            Self::Resources => "resources",
            Self::Blocking => "blocking",
            Self::Surfaces => "surface",
        }
    }

    /// Chunk file name for `id`, e.g. `objects_-1_3.json`.
    pub fn file_name(self, id: ChunkId) -> String {
        format!("{}_{}_{}.json", self.file_prefix(), id.cx, id.cy)
    }

    /// Parses a chunk file name back into its chunk id.
    ///
    /// Returns `None` for names that don't belong to this layer.
    pub fn parse_file_name(self, name: &str) -> Option<ChunkId> {
        let rest = name
            .strip_prefix(self.file_prefix())?
            .strip_prefix('_')?
            .strip_suffix(".json")?;
        let (cx, cy) = rest.split_once('_')?;
        Some(ChunkId::new(cx.parse().ok()?, cy.parse().ok()?))
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tiles => "tiles",
            Self::Objects => "objects",
            Self::Resources => "resources",
            Self::Blocking => "blocking",
            Self::Surfaces => "surfaces",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Sparse layer entries
// ---------------------------------------------------------------------------

/// A placed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    pub x: i32,
    pub y: i32,
    pub type_id: String,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub blocking: bool,
}

/// A harvestable resource node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub x: i32,
    pub y: i32,
    pub type_id: String,
    #[serde(default)]
    pub amount: i32,
}

/// A blocking footprint cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingEntry {
    pub x: i32,
    pub y: i32,
    pub type_id: String,
}

/// A walkable surface cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceEntry {
    pub x: i32,
    pub y: i32,
    pub surface_id: i32,
}

// ---------------------------------------------------------------------------
// Edit changes
// ---------------------------------------------------------------------------

/// Body of every `*EDIT|` command: `{"changes":[...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditBody<C> {
    #[serde(default = "Vec::new", alias = "Changes")]
    pub changes: Vec<C>,
}

/// Sets one terrain tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileChange {
    pub x: i32,
    pub y: i32,
    pub tile: i32,
}

/// Places, replaces or removes one object.
///
/// `blocking` falls back to the catalog definition when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectChange {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub type_id: String,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub blocking: Option<bool>,
}

/// Places, replaces or removes one resource node.
///
/// `amount` falls back to the catalog's default amount when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChange {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub type_id: String,
    #[serde(default)]
    pub amount: Option<i32>,
}

/// Places or removes one blocking cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingChange {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub type_id: String,
}

/// Sets or clears (`surfaceId == 0`) one surface cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceChange {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub surface_id: i32,
}

// ---------------------------------------------------------------------------
// Chunk payloads (responses and chunk files)
// ---------------------------------------------------------------------------

/// Dense terrain chunk: `tiles[localY * size + localX]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileChunkPayload {
    pub x: i32,
    pub y: i32,
    pub size: i32,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub tiles: Option<Vec<i32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectChunkPayload {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub objects: Option<Vec<ObjectEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChunkPayload {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub resources: Option<Vec<ResourceEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingChunkPayload {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub blocking: Option<Vec<BlockingEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceChunkPayload {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub surfaces: Option<Vec<SurfaceEntry>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_div_rounds_toward_negative_infinity() {
        assert_eq!(floor_div(0, 100), 0);
        assert_eq!(floor_div(99, 100), 0);
        assert_eq!(floor_div(100, 100), 1);
        assert_eq!(floor_div(-1, 100), -1);
        assert_eq!(floor_div(-100, 100), -1);
        assert_eq!(floor_div(-101, 100), -2);
    }

    #[test]
    fn test_floor_div_bounds_hold_for_all_sampled_values() {
        for size in [1, 7, 100] {
            for v in -1000..=1000 {
                let q = floor_div(v, size);
                assert!(q * size <= v && v < q * size + size, "v={v} size={size}");
            }
        }
        for v in [i32::MIN, i32::MIN + 1, i32::MAX - 1, i32::MAX] {
            let q = floor_div(v, CHUNK_SIZE) as i64;
            let (v, s) = (v as i64, CHUNK_SIZE as i64);
            assert!(q * s <= v && v < q * s + s);
        }
    }

    #[test]
    fn test_chunk_id_containing_and_local_offset_agree() {
        let id = ChunkId::containing(-1, 250);
        assert_eq!(id, ChunkId::new(-1, 2));
        assert_eq!(id.local_offset(-1, 250), (99, 50));
        // A tile from the neighbouring chunk is out of range locally.
        let (lx, _) = id.local_offset(0, 250);
        assert_eq!(lx, CHUNK_SIZE);
    }

    #[test]
    fn test_local_offset_at_coordinate_extremes_stays_in_chunk() {
        let low = ChunkId::containing(i32::MIN, i32::MIN);
        assert_eq!(low, ChunkId::new(-21_474_837, -21_474_837));
        assert_eq!(low.local_offset(i32::MIN, i32::MIN), (52, 52));

        let high = ChunkId::containing(i32::MAX, i32::MAX);
        assert_eq!(high.local_offset(i32::MAX, i32::MAX), (47, 47));

        // Far-off tiles saturate instead of wrapping into range.
        let (lx, ly) = high.local_offset(i32::MIN, 0);
        assert!(lx < 0 && ly < 0);
        let (lx, _) = low.local_offset(i32::MAX, 0);
        assert!(lx >= CHUNK_SIZE);
    }

    #[test]
    fn test_layer_file_name_roundtrip() {
        let id = ChunkId::new(-3, 12);
        for layer in Layer::ALL {
            let name = layer.file_name(id);
            assert_eq!(layer.parse_file_name(&name), Some(id), "{name}");
        }
        assert_eq!(Layer::Tiles.file_name(id), "chunk_-3_12.json");
        assert_eq!(Layer::Surfaces.file_name(id), "surface_-3_12.json");
    }

    #[test]
    fn test_layer_parse_file_name_rejects_other_layers_and_junk() {
        assert_eq!(Layer::Tiles.parse_file_name("objects_0_0.json"), None);
        assert_eq!(Layer::Tiles.parse_file_name("chunk_a_0.json"), None);
        assert_eq!(Layer::Tiles.parse_file_name("chunk_0_0.json.tmp"), None);
        assert_eq!(Layer::Tiles.parse_file_name("players.json"), None);
    }

    #[test]
    fn test_object_change_defaults_optional_fields() {
        let change: ObjectChange =
            serde_json::from_str(r#"{"x":10,"y":10,"typeId":"wall_wood"}"#).unwrap();
        assert_eq!(change.rotation, 0);
        assert_eq!(change.blocking, None);
        assert_eq!(change.type_id, "wall_wood");
    }

    #[test]
    fn test_entries_serialize_camel_case() {
        let entry = SurfaceEntry {
            x: 1,
            y: 2,
            surface_id: 3,
        };
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"x":1,"y":2,"surfaceId":3}"#
        );
    }

    #[test]
    fn test_chunk_payload_null_entries_deserialize_as_none() {
        let payload: ObjectChunkPayload =
            serde_json::from_str(r#"{"x":0,"y":0,"version":4,"objects":null}"#).unwrap();
        assert_eq!(payload.version, 4);
        assert!(payload.objects.is_none());
    }
}
