//! Accounts and player presence for Tileforge.
//!
//! Two registries live here, both plain single-owner structs that the
//! server keeps behind its one state lock:
//!
//! 1. **Accounts** ([`AccountStore`]): durable identities with salted
//!    PBKDF2 password hashes, access levels and appearance.
//! 2. **Presence** ([`PresenceRegistry`]): last-known player positions,
//!    which endpoint each name is bound to, and who counts as live.
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatcher (above)  ← REGISTER / LOGIN / position updates / broadcast
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← PositionUpdate, PlayerSnapshot
//! ```

mod account;
mod error;
mod presence;

pub use account::{
    Account, AccountStore, Credential, DEFAULT_ACCESS_LEVEL, LoginCheck, LoginGrant,
    PBKDF2_ROUNDS, VerifiedLogin, normalize_access_level,
};
pub use error::SessionError;
pub use presence::{PlayerState, PresenceRegistry};
