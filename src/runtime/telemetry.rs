use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);

/// Selects the JSON formatter when set to `json`.
pub const ENV_LOG_FORMAT: &str = "RELIST_LOG_FORMAT";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// `RELIST_LOG_FORMAT=json` switches to line-delimited JSON output.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(ENV_LOG_FORMAT)
        .map(|format| format.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let _ = if json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.try_init()
    };

    let _ = TRACING_INIT.set(());
}

/// Loop counters shared between the reconciler and the metrics reporter.
#[derive(Default, Debug)]
pub struct Telemetry {
    reconciled: AtomicU64,
    sold_skips: AtomicU64,
    delisted: AtomicU64,
    listed: AtomicU64,
    fetch_failures: AtomicU64,
    remediations: AtomicU64,
    skipped: AtomicU64,
    idle_polls: AtomicU64,
}

impl Telemetry {
    pub fn record_reconciled(&self) {
        self.reconciled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sold_skip(&self) {
        self.sold_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delisted(&self) {
        self.delisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listed(&self) {
        self.listed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remediation(&self) {
        self.remediations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idle_poll(&self) {
        self.idle_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            reconciled: self.reconciled.load(Ordering::Relaxed),
            sold_skips: self.sold_skips.load(Ordering::Relaxed),
            delisted: self.delisted.load(Ordering::Relaxed),
            listed: self.listed.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            remediations: self.remediations.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub reconciled: u64,
    pub sold_skips: u64,
    pub delisted: u64,
    pub listed: u64,
    pub fetch_failures: u64,
    pub remediations: u64,
    pub skipped: u64,
    pub idle_polls: u64,
}

/// Spawns a background task that periodically logs loop throughput and outcome counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "relistd::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let delta = current.reconciled.saturating_sub(last_snapshot.reconciled);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let per_minute = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        delta as f64 * 60.0 / elapsed
                    };

                    tracing::info!(
                        target: "relistd::metrics",
                        items_per_minute = format!("{per_minute:.2}"),
                        reconciled = current.reconciled,
                        listed = current.listed,
                        delisted = current.delisted,
                        sold_skips = current.sold_skips,
                        fetch_failures = current.fetch_failures,
                        remediations = current.remediations,
                        skipped = current.skipped,
                        idle_polls = current.idle_polls,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
