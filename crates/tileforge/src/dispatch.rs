//! Command routing.
//!
//! [`dispatch`] applies one parsed command to the server state and
//! decides what goes back to the sender. It runs under the state lock,
//! so it never touches the socket or the disk: replies and table
//! snapshots are handed back in an [`Outcome`] for the caller to send
//! and write once the lock is released.
//!
//! Password hashing doesn't belong under the lock either. REGISTER and
//! LOGIN take three steps:
//!
//! ```text
//! password_work (locked, cheap) → PasswordWork::run (unlocked, slow) → dispatch (locked)
//! ```

use std::net::SocketAddr;

use tileforge_protocol::{ChunkId, Command, EditBatch, Layer, PositionUpdate, Reply};
use tileforge_session::{Account, Credential, LoginCheck, SessionError, VerifiedLogin};
use tileforge_world::Catalogs;

use crate::ServerState;

/// What the caller must persist after releasing the lock.
#[derive(Debug, Default)]
pub enum Persist {
    #[default]
    Nothing,
    /// A full snapshot of the account table and the generation it was
    /// taken at.
    Accounts { generation: u64, accounts: Vec<Account> },
}

impl Persist {
    fn accounts(state: &ServerState) -> Self {
        Self::Accounts {
            generation: state.accounts.generation(),
            accounts: state.accounts.snapshot(),
        }
    }
}

/// Key derivation a command needs before it can be dispatched.
#[derive(Debug)]
pub enum PasswordWork {
    /// Nothing to derive.
    None,
    /// Hash a new account's password.
    Hash { password: String, rounds: u32 },
    /// Check a login against a copied-out credential.
    Verify { check: LoginCheck, password: String },
    /// The login already failed the lookup.
    Refused(SessionError),
}

impl PasswordWork {
    /// `true` when [`PasswordWork::run`] derives a key.
    pub fn is_slow(&self) -> bool {
        matches!(self, Self::Hash { .. } | Self::Verify { .. })
    }

    /// Does the derivation. Needs no server state.
    pub fn run(self) -> Prepared {
        match self {
            Self::None => Prepared::None,
            Self::Hash { password, rounds } => {
                Prepared::Registration(Credential::derive(&password, rounds))
            }
            Self::Verify { check, password } => Prepared::Login(check.verify(&password)),
            Self::Refused(e) => Prepared::Login(Err(e)),
        }
    }
}

/// The finished result of a [`PasswordWork`], handed to [`dispatch`].
#[derive(Debug, Default)]
pub enum Prepared {
    #[default]
    None,
    Registration(Credential),
    Login(Result<VerifiedLogin, SessionError>),
}

/// Works out what `command` needs derived. Cheap, so it runs under the lock.
///
/// A REGISTER for a taken name needs nothing: [`dispatch`] refuses it
/// before any hashing.
pub fn password_work(state: &ServerState, command: &Command) -> PasswordWork {
    match command {
        Command::Register { name, password, .. } if !state.accounts.contains(name) => {
            PasswordWork::Hash {
                password: password.clone(),
                rounds: state.accounts.rounds(),
            }
        }
        Command::Login { name, password } => match state.accounts.login_check(name) {
            Ok(check) => PasswordWork::Verify {
                check,
                password: password.clone(),
            },
            Err(e) => PasswordWork::Refused(e),
        },
        _ => PasswordWork::None,
    }
}

/// The result of dispatching one command.
#[derive(Debug, Default)]
pub struct Outcome {
    /// `None` for edits, up-to-date chunk requests and quiet drops.
    pub reply: Option<Reply>,
    pub persist: Persist,
}

impl Outcome {
    fn reply(reply: Reply) -> Self {
        Self {
            reply: Some(reply),
            persist: Persist::Nothing,
        }
    }

    fn silent() -> Self {
        Self::default()
    }
}

/// Applies `command` from `from` at wall-clock time `now` (epoch ms).
///
/// `prepared` carries the output of [`password_work`]. A REGISTER or
/// LOGIN without it derives its key here, under the lock.
pub fn dispatch(
    state: &mut ServerState,
    catalogs: &Catalogs,
    command: Command,
    prepared: Prepared,
    from: SocketAddr,
    now: u64,
) -> Outcome {
    match command {
        Command::Ping => Outcome::reply(Reply::Pong),
        Command::Register {
            name,
            password,
            appearance,
        } => register(state, &name, &password, &appearance, prepared),
        Command::Login { name, password } => {
            let verified = match prepared {
                Prepared::Login(verified) => verified,
                _ => state
                    .accounts
                    .login_check(&name)
                    .and_then(|check| check.verify(&password)),
            };
            login(state, &name, verified, from, now)
        }
        Command::ChunkRequest {
            layer,
            chunk,
            last_known_version,
        } => chunk_request(state, layer, chunk, last_known_version, from),
        Command::Edit(batch) => edit(state, catalogs, &batch, from),
        Command::Position(update) => position(state, &update, from, now),
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

fn register(
    state: &mut ServerState,
    name: &str,
    password: &str,
    appearance: &str,
    prepared: Prepared,
) -> Outcome {
    let result = if state.accounts.contains(name) {
        Err(SessionError::Exists(name.to_string()))
    } else {
        let credential = match prepared {
            Prepared::Registration(credential) => credential,
            _ => Credential::derive(password, state.accounts.rounds()),
        };
        state.accounts.insert(name, credential, appearance)
    };
    match result {
        Ok(()) => Outcome {
            reply: Some(Reply::Ok),
            persist: Persist::accounts(state),
        },
        Err(e) => {
            tracing::debug!(%name, error = %e, "register refused");
            Outcome::reply(Reply::Error(e.code()))
        }
    }
}

fn login(
    state: &mut ServerState,
    name: &str,
    verified: Result<VerifiedLogin, SessionError>,
    from: SocketAddr,
    now: u64,
) -> Outcome {
    let grant = match verified.and_then(|verified| state.accounts.complete_login(verified)) {
        Ok(grant) => grant,
        Err(e) => {
            tracing::debug!(%name, %from, error = %e, "login refused");
            return Outcome::reply(Reply::Error(e.code()));
        }
    };

    // The hash upgrade is written even if the name turns out to be taken.
    let persist = if grant.upgraded {
        Persist::accounts(state)
    } else {
        Persist::Nothing
    };

    let reply = match state.presence.login(name, from, now, &grant.appearance) {
        Ok((x, y)) => {
            let appearance = state
                .presence
                .get(name)
                .map(|p| p.appearance.clone())
                .unwrap_or(grant.appearance);
            Reply::LoginOk {
                x,
                y,
                access_level: grant.access_level,
                appearance,
            }
        }
        Err(e) => {
            tracing::debug!(%name, %from, error = %e, "login refused");
            Reply::Error(e.code())
        }
    };

    Outcome {
        reply: Some(reply),
        persist,
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

fn chunk_request(
    state: &mut ServerState,
    layer: Layer,
    chunk: ChunkId,
    last_known_version: i64,
    from: SocketAddr,
) -> Outcome {
    match state.world.request_chunk(layer, chunk, last_known_version) {
        Ok(Some(body)) => Outcome::reply(Reply::Json(body)),
        Ok(None) => {
            tracing::trace!(%from, %layer, %chunk, last_known_version, "chunk up to date");
            Outcome::silent()
        }
        Err(e) => {
            tracing::warn!(%layer, %chunk, error = %e, "chunk snapshot failed");
            Outcome::silent()
        }
    }
}

fn edit(state: &mut ServerState, catalogs: &Catalogs, batch: &EditBatch, from: SocketAddr) -> Outcome {
    let layer = batch.layer();
    let requested = batch.len();
    let applied = state.world.apply(batch, catalogs);
    if applied == 0 {
        tracing::warn!(%from, %layer, requested, "edit batch applied nothing");
    } else {
        tracing::debug!(%from, %layer, requested, applied, "edit batch applied");
    }
    Outcome::silent()
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

fn position(state: &mut ServerState, update: &PositionUpdate, from: SocketAddr, now: u64) -> Outcome {
    if let Err(e) = state.presence.update_position(update, from, now) {
        tracing::debug!(name = %update.name, %from, error = %e, "position rejected");
        return Outcome::reply(Reply::Error(e.code()));
    }

    if update.appearance.trim().is_empty()
        || !state.accounts.set_appearance(&update.name, &update.appearance)
    {
        return Outcome::silent();
    }
    tracing::debug!(name = %update.name, "appearance changed");
    Outcome {
        reply: None,
        persist: Persist::accounts(state),
    }
}
