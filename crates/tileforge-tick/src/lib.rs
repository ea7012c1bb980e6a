//! Fixed-period tickers for Tileforge.
//!
//! The server runs several cadences side by side: the ~30 Hz position
//! broadcast, the rate-limit sweep, the chunk/account flush, the player
//! save and the optional perf log. Each one is a [`Ticker`] with its own
//! period and budget monitoring. A late tick skips the periods it
//! missed and reschedules one period from when it actually fired.
//!
//! # Disabled tickers
//!
//! A ticker with a zero period never fires: [`Ticker::wait_for_tick`]
//! pends forever. That lets an optional cadence sit in a `tokio::select!`
//! unconditionally.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         result = transport.recv_from(&mut buf) => { /* handle datagram */ }
//!         _ = broadcast.wait_for_tick() => {
//!             broadcast_positions().await;
//!             broadcast.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for one ticker.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Label used in log lines.
    pub name: &'static str,
    /// Time between ticks. Zero disables the ticker.
    pub period: Duration,
    /// Fraction of the period (0.0–1.0) at which a slow tick is logged.
    pub budget_warn_threshold: f64,
    /// Fraction of the period (0.0–1.0) at which a slow tick is logged
    /// as critical.
    pub budget_critical_threshold: f64,
    /// Track average and maximum tick work time.
    pub metrics_enabled: bool,
    /// Random delay (0..max) added to the first tick only, so tickers
    /// created together don't fire together.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            name: "tick",
            period: Duration::ZERO,
            budget_warn_threshold: 0.80,
            budget_critical_threshold: 1.0,
            metrics_enabled: true,
            initial_jitter: Duration::ZERO,
        }
    }
}

impl TickConfig {
    /// A config that fires every `period`, with defaults for the rest.
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            ..Default::default()
        }
    }

    /// Clamps thresholds into `0.0..=1.0` and keeps warn ≤ critical.
    pub fn validated(mut self) -> Self {
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self.budget_critical_threshold = self.budget_critical_threshold.clamp(0.0, 1.0);
        if self.budget_warn_threshold > self.budget_critical_threshold {
            self.budget_warn_threshold = self.budget_critical_threshold;
        }
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.period.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Returned by [`Ticker::wait_for_tick`] each time it fires.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Starts at 1.
    pub tick: u64,
    /// The configured period.
    pub dt: Duration,
    /// The tick fired more than 10% of a period late.
    pub overrun: bool,
    /// Whole periods skipped because of the overrun.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics. Timing values refer to the work reported through
/// [`Ticker::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of tick work time (α = 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Work time of the most recent tick.
    pub last_tick_time: Duration,
    /// Last tick's work time over the period. >1.0 means overrun.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// A fixed-period ticker.
pub struct Ticker {
    config: TickConfig,
    tick_count: u64,
    /// When the next tick should fire. `None` when disabled.
    next_tick: Option<TokioInstant>,
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl Ticker {
    /// Creates a ticker whose first tick is one period (plus jitter) away.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();

        let next_tick = config.is_enabled().then(|| {
            let max_jitter = config.initial_jitter.as_micros() as u64;
            let jitter = if max_jitter > 0 {
                Duration::from_micros(rand::rng().random_range(0..max_jitter))
            } else {
                Duration::ZERO
            };
            TokioInstant::now() + config.period + jitter
        });

        if config.is_enabled() {
            debug!(
                ticker = config.name,
                period_ms = config.period.as_secs_f64() * 1000.0,
                "ticker created"
            );
        } else {
            debug!(ticker = config.name, "ticker disabled (zero period)");
        }

        Self {
            config,
            tick_count: 0,
            next_tick,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    /// A ticker with default settings.
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self::new(TickConfig::every(name, period))
    }

    /// Waits until the next tick is due.
    ///
    /// Pends forever on a disabled ticker; `tokio::select!` keeps
    /// serving its other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let Some(next) = self.next_tick else {
            return std::future::pending::<TickInfo>().await;
        };
        let period = self.config.period;

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let mut ticks_skipped = 0u64;

        if overrun {
            ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
            if ticks_skipped > 0 {
                warn!(
                    ticker = self.config.name,
                    tick = self.tick_count,
                    skipped = ticks_skipped,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "tick overrun, skipping ahead"
                );
            }
        }
        self.next_tick = Some(now + period);

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(ticker = self.config.name, tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            dt: period,
            overrun,
            ticks_skipped,
        }
    }

    /// Records that the work for the current tick is done.
    ///
    /// Budget warnings and timing metrics depend on this being called.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let budget = self.config.period;

        if !budget.is_zero() {
            let utilization = elapsed.as_secs_f64() / budget.as_secs_f64();
            self.metrics.budget_utilization = utilization;

            if utilization >= self.config.budget_critical_threshold {
                warn!(
                    ticker = self.config.name,
                    tick = self.tick_count,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    budget_ms = budget.as_secs_f64() * 1000.0,
                    utilization_pct = format!("{:.1}", utilization * 100.0),
                    "CRITICAL: tick exceeded budget"
                );
            } else if utilization >= self.config.budget_warn_threshold {
                warn!(
                    ticker = self.config.name,
                    tick = self.tick_count,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    budget_ms = budget.as_secs_f64() * 1000.0,
                    utilization_pct = format!("{:.1}", utilization * 100.0),
                    "tick approaching budget limit"
                );
            }
        }

        if self.config.metrics_enabled {
            self.metrics.last_tick_time = elapsed;
            if elapsed > self.metrics.max_tick_time {
                self.metrics.max_tick_time = elapsed;
            }
            let alpha = 0.1;
            let prev = self.metrics.avg_tick_time.as_secs_f64();
            let curr = elapsed.as_secs_f64();
            self.metrics.avg_tick_time =
                Duration::from_secs_f64(prev * (1.0 - alpha) + curr * alpha);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }
}
