//! Error types for the world layer.

use std::io;
use std::path::PathBuf;

use tileforge_protocol::ProtocolError;

/// Failures while loading or saving world data.
///
/// None of these are fatal: load failures mean "no data", save failures
/// are retried on the next flush.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file was readable but its contents were not valid.
    #[error("malformed data in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: ProtocolError,
    },

    #[error(transparent)]
    Codec(#[from] ProtocolError),
}
