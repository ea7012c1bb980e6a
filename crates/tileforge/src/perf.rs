//! Traffic counters and the periodic perf report.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tileforge_tick::{TickInfo, TickMetrics};

/// Counters bumped from the receive loop and the broadcast tick.
#[derive(Debug, Default)]
pub struct PerfCounters {
    received: AtomicU64,
    rejected: AtomicU64,
    throttled: AtomicU64,
    replies: AtomicU64,
    broadcasts: AtomicU64,
    late_ticks: AtomicU64,
    skipped_ticks: AtomicU64,
    max_tick_us: AtomicU64,
}

impl PerfCounters {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// An envelope that failed to open.
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A datagram dropped by the rate limiter.
    pub fn record_throttled(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reply(&self) {
        self.replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds in one finished broadcast tick.
    pub fn record_tick(&self, info: &TickInfo, metrics: &TickMetrics) {
        if info.overrun {
            self.late_ticks.fetch_add(1, Ordering::Relaxed);
        }
        self.skipped_ticks.fetch_add(info.ticks_skipped, Ordering::Relaxed);
        let work_us = metrics.last_tick_time.as_micros() as u64;
        self.max_tick_us.fetch_max(work_us, Ordering::Relaxed);
    }

    /// Reads and resets every counter.
    pub fn take(&self) -> PerfSample {
        PerfSample {
            received: self.received.swap(0, Ordering::Relaxed),
            rejected: self.rejected.swap(0, Ordering::Relaxed),
            throttled: self.throttled.swap(0, Ordering::Relaxed),
            replies: self.replies.swap(0, Ordering::Relaxed),
            broadcasts: self.broadcasts.swap(0, Ordering::Relaxed),
            late_ticks: self.late_ticks.swap(0, Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.swap(0, Ordering::Relaxed),
            max_tick_us: self.max_tick_us.swap(0, Ordering::Relaxed),
        }
    }
}

/// Counter values for one reporting interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfSample {
    pub received: u64,
    pub rejected: u64,
    pub throttled: u64,
    pub replies: u64,
    pub broadcasts: u64,
    /// Broadcast ticks that fired late.
    pub late_ticks: u64,
    /// Broadcast periods skipped by late ticks.
    pub skipped_ticks: u64,
    /// Longest broadcast tick in the interval, in microseconds.
    pub max_tick_us: u64,
}

pub const CSV_HEADER: &str = "timestamp_ms,received,rejected,throttled,replies,broadcasts,late_ticks,skipped_ticks,max_tick_us";

impl PerfSample {
    pub fn csv_row(&self, timestamp_ms: u64) -> String {
        format!(
            "{timestamp_ms},{},{},{},{},{},{},{},{}",
            self.received,
            self.rejected,
            self.throttled,
            self.replies,
            self.broadcasts,
            self.late_ticks,
            self.skipped_ticks,
            self.max_tick_us
        )
    }
}

/// Appends one row to `path`, writing the header first if the file is new.
///
/// # Errors
/// Any I/O error from opening or writing the file.
pub fn append_csv(path: &Path, sample: &PerfSample, timestamp_ms: u64) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() == 0 {
        writeln!(file, "{CSV_HEADER}")?;
    }
    writeln!(file, "{}", sample.csv_row(timestamp_ms))
}
