//! `accounts.json` and `players.json`.
//!
//! Both tables are saved whole, pretty-printed, through the same atomic
//! write as chunk files. Loading never fails: a missing file is an empty
//! table, an unreadable or malformed one is logged and treated as empty.
//!
//! Saves go through a [`TableWriter`], which writes one snapshot at a
//! time and refuses any snapshot older than the last one on disk.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tileforge_protocol::{Codec, JsonCodec};
use tileforge_session::{Account, PlayerState};
use tileforge_world::{WorldError, write_atomic};

pub const ACCOUNTS_FILE: &str = "accounts.json";
pub const PLAYERS_FILE: &str = "players.json";

pub fn load_accounts(dir: &Path) -> Vec<Account> {
    load_table(&dir.join(ACCOUNTS_FILE))
}

pub fn load_players(dir: &Path) -> Vec<PlayerState> {
    load_table(&dir.join(PLAYERS_FILE))
}

/// Serialized, generation-checked saves of one table file.
#[derive(Debug)]
pub struct TableWriter {
    path: PathBuf,
    /// Generation of the snapshot last written successfully.
    written: Mutex<Option<u64>>,
}

impl TableWriter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            written: Mutex::new(None),
        }
    }

    pub fn accounts(dir: &Path) -> Self {
        Self::new(dir.join(ACCOUNTS_FILE))
    }

    pub fn players(dir: &Path) -> Self {
        Self::new(dir.join(PLAYERS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `rows`, taken at `generation`, unless a snapshot at least as
    /// new is already on disk. Returns whether the file was written.
    ///
    /// # Errors
    /// [`WorldError`] if serialization or the atomic write fails.
    pub fn write<T: Serialize>(&self, generation: u64, rows: &[T]) -> Result<bool, WorldError> {
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if written.is_some_and(|last| generation <= last) {
            tracing::trace!(path = %self.path.display(), generation, "snapshot not newer, skipped");
            return Ok(false);
        }
        save_table(&self.path, rows)?;
        *written = Some(generation);
        Ok(true)
    }
}

fn load_table<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "table unreadable, starting empty");
            return Vec::new();
        }
    };
    if text.trim().is_empty() {
        return Vec::new();
    }
    match JsonCodec.decode(&text) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "table malformed, starting empty");
            Vec::new()
        }
    }
}

fn save_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), WorldError> {
    let text = JsonCodec.encode_pretty(&rows)?;
    write_atomic(path, &text)
}
