//! `GameServer`: startup, the event loop and shutdown.
//!
//! One task owns the socket and multiplexes inbound datagrams with the
//! broadcast and rate-limit sweep ticks. Saves run on their own tasks.
//! All of them share one [`ServerState`] behind a single mutex, held only
//! for in-memory work. Password hashing runs on the blocking pool with
//! the lock released.
//!
//! ```text
//! datagram → open envelope → rate limit → parse → password work → dispatch → reply
//! tick     → sweep stale → snapshot → seal once → send to every endpoint
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tileforge_protocol::{Reply, parse_command, render_broadcast};
use tileforge_session::Account;
use tileforge_tick::{TickConfig, Ticker};
use tileforge_transport::{
    Admission, ChannelError, DatagramTransport, MAX_DATAGRAM_LEN, SecureChannel, UdpTransport,
};
use tileforge_world::{Catalogs, load_world, write_chunks};
use tokio::sync::{Mutex, watch};

use crate::dispatch::{Persist, dispatch, password_work};
use crate::perf::{PerfCounters, append_csv};
use crate::tables::{TableWriter, load_accounts, load_players};
use crate::{ForgeError, ServerConfig, ServerState};

/// Wall-clock milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Everything the loop and the background tasks share.
struct Shared {
    transport: UdpTransport,
    channel: SecureChannel,
    catalogs: Catalogs,
    config: ServerConfig,
    state: Mutex<ServerState>,
    accounts_table: TableWriter,
    players_table: TableWriter,
    perf: PerfCounters,
}

/// A bound Tileforge server.
///
/// # Example
///
/// ```rust,ignore
/// let server = GameServer::bind(ServerConfig::from_env(7777)).await?;
/// server.run(async { let _ = tokio::signal::ctrl_c().await; }).await
/// ```
pub struct GameServer {
    shared: Arc<Shared>,
}

impl GameServer {
    /// Loads everything from the data directory and binds the socket.
    ///
    /// # Errors
    /// - [`ForgeError::Channel`] if the shared key is unusable
    /// - [`ForgeError::DataDir`] if the data directory cannot be created
    /// - [`ForgeError::Transport`] if the socket cannot be bound
    pub async fn bind(config: ServerConfig) -> Result<Self, ForgeError> {
        let channel = config.channel()?;
        if config.uses_default_key() {
            tracing::warn!("using the built-in shared key; set TILEFORGE_SHARED_KEY");
        }

        let dir = config.data_dir.clone();
        std::fs::create_dir_all(&dir).map_err(ForgeError::DataDir)?;

        let catalogs = Catalogs::load(&dir);
        let mut state = ServerState::new(&config);
        let accounts_table = TableWriter::accounts(&dir);
        let players_table = TableWriter::players(&dir);

        state.accounts.load(load_accounts(&dir));
        if state.accounts.normalize_all() {
            let snapshot = state.accounts.snapshot();
            if let Err(e) = accounts_table.write(state.accounts.generation(), &snapshot) {
                tracing::warn!(error = %e, "saving normalized accounts failed");
            }
        }
        state.presence.load(load_players(&dir));
        state.world = load_world(&dir);

        tracing::info!(
            data_dir = %dir.display(),
            accounts = state.accounts.len(),
            players = state.presence.len(),
            chunks = state.world.chunk_count(),
            "state loaded"
        );

        let transport = UdpTransport::bind(&config.bind_addr).await?;

        Ok(Self {
            shared: Arc::new(Shared {
                transport,
                channel,
                catalogs,
                config,
                state: Mutex::new(state),
                accounts_table,
                players_table,
                perf: PerfCounters::default(),
            }),
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ForgeError> {
        Ok(self.shared.transport.local_addr()?)
    }

    /// Runs until `shutdown` resolves, then saves everything.
    ///
    /// The final save waits for the background save tasks to stop first,
    /// so nothing written afterwards can be overtaken by an older save.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), ForgeError> {
        let shared = self.shared;
        let config = &shared.config;
        tracing::info!(addr = %shared.transport.local_addr()?, "Tileforge server running");

        let (stop_tx, stop_rx) = watch::channel(false);
        let background = [
            tokio::spawn(flush_loop(Arc::clone(&shared), stop_rx.clone())),
            tokio::spawn(player_save_loop(Arc::clone(&shared), stop_rx.clone())),
            tokio::spawn(perf_loop(Arc::clone(&shared), stop_rx)),
        ];

        let mut broadcast = Ticker::every("broadcast", config.broadcast_interval);
        let mut sweep = Ticker::every("rate-limit sweep", config.sweep_interval);
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                result = shared.transport.recv_from(&mut buf) => match result {
                    Ok((len, from)) => shared.handle_datagram(&buf[..len], from).await,
                    Err(e) => tracing::error!(error = %e, "receive failed"),
                },
                info = broadcast.wait_for_tick() => {
                    shared.broadcast().await;
                    broadcast.record_tick_end();
                    shared.perf.record_tick(&info, broadcast.metrics());
                }
                _ = sweep.wait_for_tick() => {
                    let removed = shared.state.lock().await.limiter.sweep(Instant::now());
                    if removed > 0 {
                        tracing::debug!(removed, "idle rate-limit entries purged");
                    }
                    sweep.record_tick_end();
                }
            }
        }

        let _ = stop_tx.send(true);
        for task in background {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }

        shared.save_players().await;
        shared.save_accounts().await;
        shared.flush_world().await;
        tracing::info!("final save complete");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hot path
// ---------------------------------------------------------------------------

impl Shared {
    async fn handle_datagram(&self, bytes: &[u8], from: SocketAddr) {
        self.perf.record_received();

        // A non-UTF-8 datagram cannot carry the text prefix.
        let opened = std::str::from_utf8(bytes)
            .map_err(|_| ChannelError::MissingPrefix)
            .and_then(|text| self.channel.open(text));
        let plaintext = match opened {
            Ok(plaintext) => plaintext,
            Err(e) => {
                self.perf.record_rejected();
                tracing::debug!(%from, error = %e, "envelope rejected");
                return;
            }
        };

        let admission = self.state.lock().await.limiter.check(from, Instant::now());
        if let Admission::Rejected { log } = admission {
            self.perf.record_throttled();
            if log {
                tracing::warn!(%from, "rate limit exceeded, dropping datagrams");
            }
            return;
        }

        let message = String::from_utf8_lossy(&plaintext);
        let command = match parse_command(&message) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(%from, error = %e, "command rejected");
                if e.replies() {
                    self.send_reply(&Reply::Error(e.code()), from).await;
                }
                return;
            }
        };
        tracing::debug!(%from, kind = %command.kind(), "command");

        let work = password_work(&*self.state.lock().await, &command);
        let prepared = if work.is_slow() {
            match tokio::task::spawn_blocking(move || work.run()).await {
                Ok(prepared) => prepared,
                Err(e) => {
                    tracing::error!(%from, error = %e, "password work failed");
                    return;
                }
            }
        } else {
            work.run()
        };

        let outcome = {
            let mut state = self.state.lock().await;
            dispatch(&mut state, &self.catalogs, command, prepared, from, unix_millis())
        };

        if let Persist::Accounts { generation, accounts } = outcome.persist {
            self.write_accounts(generation, &accounts);
        }
        if let Some(reply) = outcome.reply {
            self.send_reply(&reply, from).await;
        }
    }

    async fn send_reply(&self, reply: &Reply, to: SocketAddr) {
        let envelope = self.channel.seal(reply.to_wire().as_bytes());
        match self.transport.send_to(envelope.as_bytes(), to).await {
            Ok(()) => self.perf.record_reply(),
            Err(e) => tracing::warn!(%to, error = %e, "reply send failed"),
        }
    }

    async fn broadcast(&self) {
        let now = unix_millis();
        let (players, targets) = {
            let mut state = self.state.lock().await;
            let stale = state.presence.sweep_stale(now);
            if !stale.is_empty() {
                tracing::debug!(count = stale.len(), "stale sessions unbound");
            }
            (state.presence.broadcast_snapshot(now), state.presence.targets())
        };
        if targets.is_empty() {
            return;
        }

        let envelope = self.channel.seal(render_broadcast(&players).as_bytes());
        for target in targets {
            match self.transport.send_to(envelope.as_bytes(), target).await {
                Ok(()) => self.perf.record_broadcast(),
                Err(e) => tracing::warn!(%target, error = %e, "broadcast send failed"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

impl Shared {
    /// Writes every dirty chunk, then clears dirty flags for the versions
    /// that made it to disk.
    async fn flush_world(&self) {
        let dirty = self.state.lock().await.world.flush_snapshot();
        if dirty.is_empty() {
            return;
        }

        let written = write_chunks(&self.config.data_dir, &dirty);
        let mut state = self.state.lock().await;
        let cleared = written
            .iter()
            .filter(|(layer, id, version)| state.world.mark_flushed(*layer, *id, *version))
            .count();
        tracing::info!(
            dirty = dirty.len(),
            written = written.len(),
            cleared,
            "chunks flushed"
        );
    }

    async fn save_players(&self) {
        let (generation, players) = {
            let state = self.state.lock().await;
            (state.presence.generation(), state.presence.snapshot())
        };
        match self.players_table.write(generation, &players) {
            Ok(true) => tracing::debug!(count = players.len(), generation, "players saved"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "player save failed"),
        }
    }

    async fn save_accounts(&self) {
        let (generation, accounts) = {
            let state = self.state.lock().await;
            (state.accounts.generation(), state.accounts.snapshot())
        };
        self.write_accounts(generation, &accounts);
    }

    fn write_accounts(&self, generation: u64, accounts: &[Account]) {
        match self.accounts_table.write(generation, accounts) {
            Ok(true) => tracing::debug!(count = accounts.len(), generation, "accounts saved"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "account save failed"),
        }
    }
}

async fn flush_loop(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let mut ticker = Ticker::every("flush", shared.config.flush_interval);
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.wait_for_tick() => {
                shared.flush_world().await;
                shared.save_accounts().await;
                shared.save_players().await;
                ticker.record_tick_end();
            }
        }
    }
}

async fn player_save_loop(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let mut ticker = Ticker::new(TickConfig {
        initial_jitter: Duration::from_secs(1),
        ..TickConfig::every("player save", shared.config.player_save_interval)
    });
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.wait_for_tick() => {
                shared.save_players().await;
                ticker.record_tick_end();
            }
        }
    }
}

async fn perf_loop(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let mut ticker = Ticker::every("perf", shared.config.perf_interval);
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.wait_for_tick() => {
                let sample = shared.perf.take();
                let (players, chunks, dirty) = {
                    let state = shared.state.lock().await;
                    (state.presence.bound(), state.world.chunk_count(), state.world.dirty_count())
                };
                tracing::info!(
                    received = sample.received,
                    rejected = sample.rejected,
                    throttled = sample.throttled,
                    replies = sample.replies,
                    broadcasts = sample.broadcasts,
                    late_ticks = sample.late_ticks,
                    skipped_ticks = sample.skipped_ticks,
                    max_tick_us = sample.max_tick_us,
                    players,
                    chunks,
                    dirty,
                    "perf"
                );
                if let Some(path) = &shared.config.perf_csv {
                    if let Err(e) = append_csv(path, &sample, unix_millis()) {
                        tracing::warn!(path = %path.display(), error = %e, "perf csv write failed");
                    }
                }
                ticker.record_tick_end();
            }
        }
    }
}
