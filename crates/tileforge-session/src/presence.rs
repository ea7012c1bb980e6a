//! Player presence: positions, endpoint bindings and liveness.
//!
//! A player record outlives its endpoint binding. The tick-time sweep
//! unbinds names that have gone quiet, but the record itself stays so a
//! later login can spawn the player where they left off.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tileforge_protocol::{LOGIN_SENTINEL_ID, PlayerSnapshot, PositionUpdate};

use crate::SessionError;

/// Last-known state of one player. Persisted to `players.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Client-chosen id, or the login sentinel before the first move.
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "X")]
    pub x: f32,
    #[serde(alias = "Y")]
    pub y: f32,
    /// Milliseconds since the Unix epoch. Older files store an ISO-8601
    /// timestamp here instead.
    #[serde(default, alias = "LastSeenUtc", deserialize_with = "last_seen_millis")]
    pub last_seen_utc: u64,
    #[serde(default, alias = "Appearance")]
    pub appearance: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LastSeen {
    Millis(u64),
    Text(String),
}

/// Accepts epoch milliseconds or an ISO-8601 string. A timestamp that
/// can't be read becomes 0, which only makes the record stale.
fn last_seen_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match LastSeen::deserialize(deserializer)? {
        LastSeen::Millis(ms) => ms,
        LastSeen::Text(text) => parse_timestamp(&text).unwrap_or_else(|| {
            tracing::warn!(value = %text, "unreadable lastSeenUtc, treating as stale");
            0
        }),
    })
}

/// RFC 3339, or a bare `YYYY-MM-DDTHH:MM:SS[.fff]` taken as UTC.
fn parse_timestamp(text: &str) -> Option<u64> {
    let text = text.trim();
    let millis = match DateTime::parse_from_rfc3339(text) {
        Ok(at) => at.timestamp_millis(),
        Err(_) => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .and_utc()
            .timestamp_millis(),
    };
    Some(u64::try_from(millis).unwrap_or(0))
}

/// Player records plus the name → endpoint map.
#[derive(Debug)]
pub struct PresenceRegistry {
    players: HashMap<String, PlayerState>,
    endpoints: HashMap<String, SocketAddr>,
    active_window_ms: u64,
    /// Bumped whenever a player record changes.
    generation: u64,
}

impl PresenceRegistry {
    /// Records older than `active_window` are stale.
    pub fn new(active_window: Duration) -> Self {
        Self {
            players: HashMap::new(),
            endpoints: HashMap::new(),
            active_window_ms: active_window.as_millis() as u64,
            generation: 0,
        }
    }

    /// Replaces all player records. Loaded players start unbound.
    pub fn load(&mut self, players: Vec<PlayerState>) {
        self.generation += 1;
        self.players.clear();
        self.endpoints.clear();
        for player in players {
            if player.name.trim().is_empty() {
                continue;
            }
            self.players.insert(player.name.clone(), player);
        }
        tracing::info!(count = self.players.len(), "players loaded");
    }

    /// Changes with every record update; equal generations mean equal
    /// snapshots.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Every record, sorted by name, for persistence.
    pub fn snapshot(&self) -> Vec<PlayerState> {
        let mut all: Vec<PlayerState> = self.players.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn is_live(&self, state: &PlayerState, now: u64) -> bool {
        now.saturating_sub(state.last_seen_utc) <= self.active_window_ms
    }

    /// `true` only when `name` is live and bound to an endpoint other
    /// than `from`.
    pub fn is_name_taken(&self, name: &str, from: SocketAddr, now: u64) -> bool {
        let Some(state) = self.players.get(name) else {
            return false;
        };
        if !self.is_live(state, now) {
            return false;
        }
        match self.endpoints.get(name) {
            Some(bound) => *bound != from,
            None => false,
        }
    }

    /// Replaces the player's record with the reported position and binds
    /// the endpoint. A blank appearance keeps the previous one.
    ///
    /// # Errors
    /// [`SessionError::NameTaken`] when another endpoint holds the name.
    pub fn update_position(
        &mut self,
        update: &PositionUpdate,
        from: SocketAddr,
        now: u64,
    ) -> Result<(), SessionError> {
        if self.is_name_taken(&update.name, from, now) {
            return Err(SessionError::NameTaken(update.name.clone()));
        }

        let appearance = if update.appearance.trim().is_empty() {
            self.players
                .get(&update.name)
                .map(|p| p.appearance.clone())
                .unwrap_or_default()
        } else {
            update.appearance.clone()
        };

        self.players.insert(
            update.name.clone(),
            PlayerState {
                id: update.id.clone(),
                name: update.name.clone(),
                x: update.x,
                y: update.y,
                last_seen_utc: now,
                appearance,
            },
        );
        self.endpoints.insert(update.name.clone(), from);
        self.generation += 1;
        Ok(())
    }

    /// Binds `name` to `from` after a successful password check and
    /// returns the spawn position.
    ///
    /// A live record keeps its position and id. Otherwise the player
    /// respawns at the last known position (or the origin) in the
    /// not-yet-moved state, hidden from broadcasts until the first
    /// position update.
    ///
    /// # Errors
    /// [`SessionError::NameTaken`] when another endpoint holds the name.
    pub fn login(
        &mut self,
        name: &str,
        from: SocketAddr,
        now: u64,
        appearance: &str,
    ) -> Result<(f32, f32), SessionError> {
        if self.is_name_taken(name, from, now) {
            return Err(SessionError::NameTaken(name.to_string()));
        }

        let live = self
            .players
            .get(name)
            .is_some_and(|state| self.is_live(state, now));

        let mut state = match self.players.get(name) {
            Some(existing) if live => PlayerState {
                last_seen_utc: now,
                ..existing.clone()
            },
            existing => PlayerState {
                id: LOGIN_SENTINEL_ID.to_string(),
                name: name.to_string(),
                x: existing.map_or(0.0, |p| p.x),
                y: existing.map_or(0.0, |p| p.y),
                last_seen_utc: now,
                appearance: existing.map(|p| p.appearance.clone()).unwrap_or_default(),
            },
        };

        if !appearance.trim().is_empty() {
            state.appearance = appearance.to_string();
        }
        let spawn = (state.x, state.y);
        self.players.insert(name.to_string(), state);
        self.endpoints.insert(name.to_string(), from);
        self.generation += 1;

        tracing::info!(%name, %from, x = spawn.0, y = spawn.1, "player logged in");
        Ok(spawn)
    }

    /// Unbinds every name whose record is stale (or gone). Returns the
    /// names unbound.
    pub fn sweep_stale(&mut self, now: u64) -> Vec<String> {
        let stale: Vec<String> = self
            .endpoints
            .keys()
            .filter(|name| match self.players.get(*name) {
                Some(state) => !self.is_live(state, now),
                None => true,
            })
            .cloned()
            .collect();

        for name in &stale {
            self.endpoints.remove(name);
            tracing::debug!(%name, "session went stale");
        }
        stale
    }

    /// Live players that have moved since logging in, sorted by name.
    pub fn broadcast_snapshot(&self, now: u64) -> Vec<PlayerSnapshot> {
        let mut live: Vec<PlayerSnapshot> = self
            .players
            .values()
            .filter(|p| p.id != LOGIN_SENTINEL_ID && self.is_live(p, now))
            .map(|p| PlayerSnapshot {
                id: p.id.clone(),
                name: p.name.clone(),
                x: p.x,
                y: p.y,
                appearance: p.appearance.clone(),
            })
            .collect();
        live.sort_by(|a, b| a.name.cmp(&b.name));
        live
    }

    /// Bound endpoints, each listed once.
    pub fn targets(&self) -> Vec<SocketAddr> {
        let mut seen = HashSet::new();
        let mut targets: Vec<SocketAddr> = self
            .endpoints
            .values()
            .copied()
            .filter(|addr| seen.insert(*addr))
            .collect();
        targets.sort();
        targets
    }

    pub fn get(&self, name: &str) -> Option<&PlayerState> {
        self.players.get(name)
    }

    pub fn endpoint(&self, name: &str) -> Option<SocketAddr> {
        self.endpoints.get(name).copied()
    }

    /// Number of player records, bound or not.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Number of bound endpoints.
    pub fn bound(&self) -> usize {
        self.endpoints.len()
    }
}
