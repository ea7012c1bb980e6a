//! # Tileforge
//!
//! Authoritative UDP server for a chunked multiplayer tile world.
//!
//! Clients speak a pipe-delimited plaintext protocol inside an
//! authenticated `SEC1|` envelope. The server owns accounts, player
//! presence and five world layers, answers commands, pushes player
//! positions about thirty times a second and keeps everything on disk.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tileforge::prelude::*;
//!
//! # async fn start() -> Result<(), ForgeError> {
//! let server = GameServer::bind(ServerConfig::from_env(DEFAULT_PORT)).await?;
//! server
//!     .run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

mod config;
mod dispatch;
mod error;
mod perf;
mod server;
mod state;
mod tables;

pub use config::{
    DEFAULT_PORT, DEFAULT_SHARED_KEY, ENV_DATA_DIR, ENV_PERF_CSV, ENV_PERF_INTERVAL_SECS,
    ENV_RATE_BURST, ENV_RATE_PER_SEC, ENV_SHARED_KEY, ServerConfig,
};
pub use dispatch::{Outcome, PasswordWork, Persist, Prepared, dispatch, password_work};
pub use error::ForgeError;
pub use perf::{CSV_HEADER, PerfCounters, PerfSample, append_csv};
pub use server::{GameServer, unix_millis};
pub use state::ServerState;
pub use tables::{ACCOUNTS_FILE, PLAYERS_FILE, TableWriter, load_accounts, load_players};

/// Convenience re-exports for embedding the server or writing a client.
pub mod prelude {
    pub use crate::{DEFAULT_PORT, ForgeError, GameServer, ServerConfig};
    pub use tileforge_protocol::{Command, Reply, parse_command};
    pub use tileforge_transport::{RateLimitConfig, SecureChannel};
    pub use tileforge_world::Catalogs;
}
