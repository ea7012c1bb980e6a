//! Integration tests for the fixed-period ticker.
//!
//! Tests run with paused Tokio time, so sleeps resolve as soon as the
//! runtime has nothing else to do.

use std::time::Duration;

use tileforge_tick::{TickConfig, Ticker};

fn broadcast_config() -> TickConfig {
    TickConfig::every("broadcast", Duration::from_millis(33))
}

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_default_config_is_disabled() {
    let cfg = TickConfig::default();
    assert!(!cfg.is_enabled());
    assert!(cfg.metrics_enabled);
}

#[test]
fn test_validated_clamps_thresholds() {
    let cfg = TickConfig {
        budget_warn_threshold: 3.0,
        budget_critical_threshold: 0.5,
        ..broadcast_config()
    }
    .validated();
    assert_eq!(cfg.budget_critical_threshold, 0.5);
    assert_eq!(cfg.budget_warn_threshold, 0.5);
}

// =========================================================================
// Ticker creation and accessors
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ticker_initial_state() {
    let t = Ticker::new(broadcast_config());
    assert_eq!(t.tick_count(), 0);
    assert!(t.is_enabled());
    assert_eq!(t.period(), Duration::from_millis(33));
    assert_eq!(t.name(), "broadcast");
    assert_eq!(t.metrics().total_ticks, 0);
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_after_one_period() {
    let mut t = Ticker::new(broadcast_config());
    let start = tokio::time::Instant::now();

    let info = t.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert_eq!(info.dt, Duration::from_millis(33));
    assert!(!info.overrun);
    assert_eq!(start.elapsed(), Duration::from_millis(33));
}

#[tokio::test(start_paused = true)]
async fn test_multiple_ticks_increment_monotonically() {
    let mut t = Ticker::every("sweep", Duration::from_secs(30));
    for expected in 1..=5 {
        let info = t.wait_for_tick().await;
        assert_eq!(info.tick, expected);
        t.record_tick_end();
    }
    assert_eq!(t.tick_count(), 5);
    assert_eq!(t.metrics().total_ticks, 5);
}

#[tokio::test(start_paused = true)]
async fn test_jitter_delays_only_first_tick() {
    let mut t = Ticker::new(TickConfig {
        initial_jitter: Duration::from_millis(10),
        ..TickConfig::every("save", Duration::from_millis(100))
    });
    let start = tokio::time::Instant::now();

    t.wait_for_tick().await;
    let first = start.elapsed();
    assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(110));

    t.wait_for_tick().await;
    assert_eq!(start.elapsed(), first + Duration::from_millis(100));
}

// =========================================================================
// Disabled ticker pends forever
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_zero_period_never_fires() {
    let mut t = Ticker::every("perf", Duration::ZERO);
    assert!(!t.is_enabled());

    let result = tokio::time::timeout(Duration::from_secs(3600), t.wait_for_tick()).await;
    assert!(result.is_err(), "disabled ticker should pend forever");
}

// =========================================================================
// Overruns
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_overrun_reports_skipped_periods() {
    let mut t = Ticker::every("flush", Duration::from_millis(100));
    t.wait_for_tick().await;

    // Hold the ticker up for three and a half periods.
    tokio::time::advance(Duration::from_millis(450)).await;
    let info = t.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 3);
    assert_eq!(t.metrics().total_overruns, 1);
    assert_eq!(t.metrics().total_skipped, 3);

    // The next tick is a full period after the late one.
    let start = tokio::time::Instant::now();
    t.wait_for_tick().await;
    assert_eq!(start.elapsed(), Duration::from_millis(100));
}

// =========================================================================
// Metrics
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_without_wait_is_noop() {
    let mut t = Ticker::new(broadcast_config());
    t.record_tick_end();
    assert_eq!(t.metrics().max_tick_time, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_track_real_work_time() {
    let mut t = Ticker::new(broadcast_config());
    t.wait_for_tick().await;
    // Work time is measured on the wall clock, not Tokio's.
    std::thread::sleep(Duration::from_micros(50));
    t.record_tick_end();

    let m = t.metrics();
    assert!(m.max_tick_time > Duration::ZERO);
    assert_eq!(m.last_tick_time, m.max_tick_time);
    assert!(m.budget_utilization > 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_disabled_skips_timing() {
    let mut t = Ticker::new(TickConfig {
        metrics_enabled: false,
        ..broadcast_config()
    });
    t.wait_for_tick().await;
    std::thread::sleep(Duration::from_micros(50));
    t.record_tick_end();

    assert_eq!(t.metrics().avg_tick_time, Duration::ZERO);
    assert_eq!(t.metrics().max_tick_time, Duration::ZERO);
    assert_eq!(t.metrics().last_tick_time, Duration::ZERO);
}

// =========================================================================
// select! loop pattern
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_with_two_tickers() {
    let mut broadcast = Ticker::new(broadcast_config());
    let mut sweep = Ticker::every("sweep", Duration::from_millis(100));
    let stop = tokio::time::sleep(Duration::from_millis(340));
    tokio::pin!(stop);

    let (mut broadcasts, mut sweeps) = (0u64, 0u64);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = broadcast.wait_for_tick() => {
                broadcasts += 1;
                broadcast.record_tick_end();
            }
            _ = sweep.wait_for_tick() => {
                sweeps += 1;
                sweep.record_tick_end();
            }
        }
    }

    assert_eq!(sweeps, 3);
    assert!(broadcasts >= 9, "expected ~10 broadcasts, got {broadcasts}");
}
