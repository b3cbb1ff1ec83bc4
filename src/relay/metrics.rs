//! Process-wide traffic counters and the periodic snapshot reporter.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Raw counters, only reachable through the aggregator's lock.
#[derive(Debug, Default)]
struct Counters {
    total_connections: u64,
    active_connections: u64,
    bytes_transferred: u64,
}

/// Thread-safe connection and byte counters.
///
/// Every mutation and every snapshot goes through one mutex, so a snapshot is
/// always internally consistent.
#[derive(Debug)]
pub struct MetricsAggregator {
    counters: Mutex<Counters>,
    started_at: Instant,
}

/// Point-in-time view of the aggregator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    /// Connections accepted since start.
    pub total_connections: u64,
    /// Connections currently being relayed.
    pub active_connections: u64,
    /// Bytes relayed in either direction, TCP and UDP.
    pub bytes_transferred: u64,
    /// Time since the aggregator was created.
    pub uptime: Duration,
    /// `bytes_transferred / uptime`, or 0 when no time has elapsed.
    pub bytes_per_second: f64,
}

impl MetricsSnapshot {
    /// Uptime in fractional seconds.
    #[must_use]
    pub fn uptime_seconds(&self) -> f64 {
        self.uptime.as_secs_f64()
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "connections={} active={} bytes={} uptime={:.1}s rate={:.1}B/s",
            self.total_connections,
            self.active_connections,
            self.bytes_transferred,
            self.uptime_seconds(),
            self.bytes_per_second
        )
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    /// Create an aggregator whose uptime starts now.
    #[must_use]
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    /// Create an aggregator with an explicit start time.
    #[must_use]
    pub fn started_at(started_at: Instant) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            started_at,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        // Counters stay consistent even if a holder panicked.
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an accepted connection.
    pub fn increment_connection(&self) {
        let mut counters = self.lock();
        counters.total_connections += 1;
        counters.active_connections += 1;
    }

    /// Record a finished connection. Saturates at zero.
    pub fn decrement_active(&self) {
        let mut counters = self.lock();
        counters.active_connections = counters.active_connections.saturating_sub(1);
    }

    /// Add relayed bytes.
    pub fn add_bytes(&self, n: u64) {
        let mut counters = self.lock();
        counters.bytes_transferred = counters.bytes_transferred.saturating_add(n);
    }

    /// Consistent snapshot as of now.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Consistent snapshot as of `now`.
    #[must_use]
    pub fn snapshot_at(&self, now: Instant) -> MetricsSnapshot {
        let counters = self.lock();
        let uptime = now.saturating_duration_since(self.started_at);
        let secs = uptime.as_secs_f64();
        let bytes_per_second = if secs > 0.0 {
            counters.bytes_transferred as f64 / secs
        } else {
            0.0
        };

        MetricsSnapshot {
            total_connections: counters.total_connections,
            active_connections: counters.active_connections,
            bytes_transferred: counters.bytes_transferred,
            uptime,
            bytes_per_second,
        }
    }
}

/// Background task that logs a snapshot on a fixed interval.
#[derive(Debug)]
pub struct MetricsReporter {
    metrics: Arc<MetricsAggregator>,
    interval: Duration,
}

impl MetricsReporter {
    /// Default reporting interval.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a reporter for `metrics`.
    #[must_use]
    pub fn new(metrics: Arc<MetricsAggregator>, interval: Duration) -> Self {
        Self { metrics, interval }
    }

    /// Spawn the reporting loop. It runs until the handle is aborted or the
    /// runtime shuts down; the first report is emitted immediately.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let snapshot = self.metrics.snapshot();
                info!(
                    total_connections = snapshot.total_connections,
                    active_connections = snapshot.active_connections,
                    bytes_transferred = snapshot.bytes_transferred,
                    uptime_seconds = snapshot.uptime_seconds(),
                    bytes_per_second = snapshot.bytes_per_second,
                    "Performance metrics"
                );
            }
        })
    }
}
