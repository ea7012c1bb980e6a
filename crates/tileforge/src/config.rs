//! Server configuration.
//!
//! Everything tunable comes from `TILEFORGE_*` environment variables,
//! except the listen port which is the binary's only argument. Lookups
//! go through an injectable function so tests never touch the process
//! environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tileforge_session::PBKDF2_ROUNDS;
use tileforge_transport::{RateLimitConfig, SecureChannel};

use crate::ForgeError;

pub const DEFAULT_PORT: u16 = 7777;

/// Built-in shared key. Any real deployment must override it.
pub const DEFAULT_SHARED_KEY: &str = "dGlsZWZvcmdlLWRldmVsb3BtZW50LWtleS0wMDAwMDE=";

pub const ENV_SHARED_KEY: &str = "TILEFORGE_SHARED_KEY";
pub const ENV_RATE_PER_SEC: &str = "TILEFORGE_RATE_PER_SEC";
pub const ENV_RATE_BURST: &str = "TILEFORGE_RATE_BURST";
pub const ENV_PERF_INTERVAL_SECS: &str = "TILEFORGE_PERF_INTERVAL_SECS";
pub const ENV_PERF_CSV: &str = "TILEFORGE_PERF_CSV";
pub const ENV_DATA_DIR: &str = "TILEFORGE_DATA_DIR";

/// Runtime settings for one server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` for the UDP socket.
    pub bind_addr: String,
    /// Base64 of the 32-byte envelope key.
    pub shared_key: String,
    /// Where `players.json`, `accounts.json`, catalogs and chunk files live.
    pub data_dir: PathBuf,
    pub rate_limit: RateLimitConfig,
    /// A player silent for longer than this is stale.
    pub active_window: Duration,
    pub broadcast_interval: Duration,
    /// Dirty chunks plus both tables.
    pub flush_interval: Duration,
    /// Players table only.
    pub player_save_interval: Duration,
    pub sweep_interval: Duration,
    /// Zero disables perf logging.
    pub perf_interval: Duration,
    pub perf_csv: Option<PathBuf>,
    /// PBKDF2 iterations for new and upgraded credentials.
    pub pbkdf2_rounds: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            shared_key: DEFAULT_SHARED_KEY.to_string(),
            data_dir: PathBuf::from("."),
            rate_limit: RateLimitConfig::default(),
            active_window: Duration::from_secs(10),
            broadcast_interval: Duration::from_millis(33),
            flush_interval: Duration::from_secs(30),
            player_save_interval: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(30),
            perf_interval: Duration::ZERO,
            perf_csv: None,
            pbkdf2_rounds: PBKDF2_ROUNDS,
        }
    }
}

impl ServerConfig {
    /// Reads the process environment.
    pub fn from_env(port: u16) -> Self {
        Self::from_env_with(port, |key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for
    /// anything unset or unparsable.
    ///
    /// The shared key is only checked later by [`ServerConfig::channel`],
    /// which is where a bad key becomes fatal.
    pub fn from_env_with(port: u16, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let perf_secs: u64 = parse_or(value(ENV_PERF_INTERVAL_SECS), ENV_PERF_INTERVAL_SECS, 0);

        Self {
            bind_addr: format!("0.0.0.0:{port}"),
            shared_key: value(ENV_SHARED_KEY)
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.shared_key),
            data_dir: value(ENV_DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            rate_limit: RateLimitConfig {
                per_second: parse_or(
                    value(ENV_RATE_PER_SEC),
                    ENV_RATE_PER_SEC,
                    defaults.rate_limit.per_second,
                ),
                burst: parse_or(value(ENV_RATE_BURST), ENV_RATE_BURST, defaults.rate_limit.burst),
                ..defaults.rate_limit
            },
            perf_interval: Duration::from_secs(perf_secs),
            perf_csv: value(ENV_PERF_CSV).map(PathBuf::from),
            ..defaults
        }
    }

    /// Builds the envelope channel from the configured key.
    ///
    /// # Errors
    /// [`ChannelError::InvalidKey`](tileforge_transport::ChannelError::InvalidKey)
    /// if the key is not base64 of exactly 32 bytes.
    pub fn channel(&self) -> Result<SecureChannel, ForgeError> {
        Ok(SecureChannel::from_base64(&self.shared_key)?)
    }

    pub fn uses_default_key(&self) -> bool {
        self.shared_key == DEFAULT_SHARED_KEY
    }
}

fn parse_or<T: FromStr + Copy>(raw: Option<String>, key: &str, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }
    }
}
