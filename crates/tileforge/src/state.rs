//! The mutable server state that lives behind the one coarse lock.

use tileforge_session::{AccountStore, PresenceRegistry};
use tileforge_transport::RateLimiter;
use tileforge_world::World;

use crate::ServerConfig;

/// Accounts, presence, the rate-limit table and the five world layers.
///
/// Every field is plain in-memory data. Holders of the lock never do
/// file or socket I/O; they copy out what needs writing and release.
pub struct ServerState {
    pub accounts: AccountStore,
    pub presence: PresenceRegistry,
    pub limiter: RateLimiter,
    pub world: World,
}

impl ServerState {
    /// Empty state sized by `config`.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            accounts: AccountStore::with_rounds(config.pbkdf2_rounds),
            presence: PresenceRegistry::new(config.active_window),
            limiter: RateLimiter::new(config.rate_limit.clone()),
            world: World::new(),
        }
    }
}
