//! Chunk files on disk.
//!
//! Each chunk of each layer lives in its own JSON file named after the
//! layer and chunk coordinates (see [`Layer::file_name`]). Writes go to a
//! sibling `.tmp` file first and are renamed into place, so a crash never
//! leaves a half-written chunk behind.

use std::fs;
use std::path::{Path, PathBuf};

use tileforge_protocol::{ChunkId, Layer};

use crate::{DirtyChunk, World, WorldError};

/// Writes `contents` to `path` via a temporary file and a rename.
///
/// # Errors
/// [`WorldError::Write`] if either step fails. The temporary file is
/// cleaned up on a failed rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), WorldError> {
    let tmp = tmp_path(path);
    fs::write(&tmp, contents).map_err(|source| WorldError::Write {
        path: tmp.clone(),
        source,
    })?;
    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(WorldError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes each chunk to `dir`. Returns the chunks that made it to disk;
/// failures are logged and left dirty for the next flush.
pub fn write_chunks(dir: &Path, chunks: &[DirtyChunk]) -> Vec<(Layer, ChunkId, u64)> {
    let mut written = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let path = dir.join(chunk.layer.file_name(chunk.id));
        match write_atomic(&path, &chunk.body) {
            Ok(()) => written.push((chunk.layer, chunk.id, chunk.version)),
            Err(e) => tracing::warn!(error = %e, "chunk save failed"),
        }
    }
    written
}

/// Builds a world from every chunk file in `dir`.
///
/// A missing directory yields an empty world. Unreadable or malformed
/// files are logged and skipped; a file's chunk coordinates come from
/// its name, not its contents.
pub fn load_world(dir: &Path) -> World {
    let mut world = World::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::info!(dir = %dir.display(), error = %e, "no world data, starting empty");
            return world;
        }
    };

    let mut loaded = 0usize;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some((layer, id)) = Layer::ALL
            .into_iter()
            .find_map(|layer| layer.parse_file_name(name).map(|id| (layer, id)))
        else {
            continue;
        };

        let path = entry.path();
        let result = fs::read_to_string(&path)
            .map_err(|source| WorldError::Read {
                path: path.clone(),
                source,
            })
            .and_then(|text| {
                world
                    .load_chunk(layer, id, &text)
                    .map_err(|source| WorldError::Malformed {
                        path: path.clone(),
                        source,
                    })
            });
        match result {
            Ok(()) => loaded += 1,
            Err(e) => tracing::warn!(error = %e, "skipping chunk file"),
        }
    }

    tracing::info!(chunks = loaded, "world loaded");
    world
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_target_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("players.json");
        write_atomic(&path, "[1]").unwrap();
        write_atomic(&path, "[2]").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[2]");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_write_atomic_missing_directory_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("x.json");
        assert!(matches!(write_atomic(&path, "{}"), Err(WorldError::Write { .. })));
    }

    #[test]
    fn test_load_world_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let world = load_world(&dir.path().join("absent"));
        assert_eq!(world.chunk_count(), 0);
    }
}
