//! Lock-free metrics registry for the collection engine.
//!
//! All counters are single-word atomics; the only lock is a read-write
//! lock guarding growth of the error-by-kind map (increments take the
//! read side). Nothing is ever cleared - every field is either monotonic
//! or a gauge, and resets happen only by process restart.
//!
//! # Latency histogram
//!
//! Latencies land in fixed buckets with upper bounds (in microseconds)
//! `1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s` plus an
//! overflow bucket. [`MetricsRegistry::percentile`] reports the upper
//! bound (in milliseconds) of the bucket containing the requested share
//! of cumulative observations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Histogram bucket upper bounds in microseconds.
pub const BUCKET_BOUNDS_US: [u64; 11] = [
    1_000, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 500_000, 1_000_000, 5_000_000,
    10_000_000,
];

/// Bucket count including the overflow bucket.
const BUCKET_COUNT: usize = BUCKET_BOUNDS_US.len() + 1;

// ═══════════════════════════════════════════════════════════════════════════════
// METRICS SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Copy-on-read bundle of every metric the registry tracks.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Collections attempted (always `successful + failed`).
    pub collections_total: u64,
    /// Collections that produced a usable result.
    pub collections_successful: u64,
    /// Collections that ended in a terminal error.
    pub collections_failed: u64,
    /// Mean collection latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Fastest collection in milliseconds (0 with no samples).
    pub min_latency_ms: f64,
    /// Slowest collection in milliseconds.
    pub max_latency_ms: f64,
    /// Median latency bucket bound in milliseconds.
    pub p50_latency_ms: f64,
    /// 95th-percentile latency bucket bound in milliseconds.
    pub p95_latency_ms: f64,
    /// 99th-percentile latency bucket bound in milliseconds.
    pub p99_latency_ms: f64,
    /// Validator results consumed by the aggregator.
    pub validators_processed: u64,
    /// Snapshots committed to the store.
    pub snapshots_stored: u64,
    /// Serialized bytes committed to the store.
    pub bytes_stored: u64,
    /// 429 responses observed upstream.
    pub rate_limit_hits: u64,
    /// Terminal errors by kind tag.
    pub errors_by_kind: HashMap<&'static str, u64>,
    /// Worker-count gauge.
    pub worker_count: usize,
    /// Task-queue-depth gauge.
    pub queue_depth: usize,
    /// Time since the registry was created.
    pub uptime: Duration,
}

// ═══════════════════════════════════════════════════════════════════════════════
// METRICS REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared metrics registry; create once at startup, share via `Arc`.
#[derive(Debug)]
pub struct MetricsRegistry {
    started_at: Instant,

    collections_successful: AtomicU64,
    collections_failed: AtomicU64,
    validators_processed: AtomicU64,
    snapshots_stored: AtomicU64,
    bytes_stored: AtomicU64,
    rate_limit_hits: AtomicU64,

    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
    latency_buckets: [AtomicU64; BUCKET_COUNT],

    worker_count: AtomicUsize,
    queue_depth: AtomicUsize,

    /// Write lock only for inserting a previously unseen kind.
    errors_by_kind: RwLock<HashMap<&'static str, AtomicU64>>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Create a fresh registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            collections_successful: AtomicU64::new(0),
            collections_failed: AtomicU64::new(0),
            validators_processed: AtomicU64::new(0),
            snapshots_stored: AtomicU64::new(0),
            bytes_stored: AtomicU64::new(0),
            rate_limit_hits: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            worker_count: AtomicUsize::new(0),
            queue_depth: AtomicUsize::new(0),
            errors_by_kind: RwLock::new(HashMap::new()),
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // RECORDING
    // ───────────────────────────────────────────────────────────────────────────

    /// Record the outcome of one collection.
    pub fn record_collection(&self, success: bool) {
        if success {
            self.collections_successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.collections_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one collection latency.
    pub fn record_latency(&self, duration: Duration) {
        let us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);

        self.latency_min_us.fetch_min(us, Ordering::Relaxed);
        self.latency_max_us.fetch_max(us, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);

        let bucket = BUCKET_BOUNDS_US
            .iter()
            .position(|bound| us <= *bound)
            .unwrap_or(BUCKET_COUNT - 1);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    /// Count a terminal error by its kind tag.
    pub fn record_error(&self, kind: &'static str) {
        {
            let map = self.errors_by_kind.read();
            if let Some(counter) = map.get(kind) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        let mut map = self.errors_by_kind.write();
        map.entry(kind)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Count a 429 response from the beacon node.
    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count validator results consumed by the aggregator.
    pub fn add_validators_processed(&self, count: u64) {
        self.validators_processed.fetch_add(count, Ordering::Relaxed);
    }

    /// Count snapshots committed to the store.
    pub fn add_snapshots_stored(&self, count: u64) {
        self.snapshots_stored.fetch_add(count, Ordering::Relaxed);
    }

    /// Count serialized bytes committed to the store.
    pub fn add_bytes_stored(&self, bytes: u64) {
        self.bytes_stored.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Update the worker-count gauge.
    pub fn set_worker_count(&self, workers: usize) {
        self.worker_count.store(workers, Ordering::Relaxed);
    }

    /// Update the queue-depth gauge.
    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    // ───────────────────────────────────────────────────────────────────────────
    // READING
    // ───────────────────────────────────────────────────────────────────────────

    /// Upper bound (in milliseconds) of the bucket containing the `p`-th
    /// percentile of cumulative observations.
    ///
    /// Returns 0 with no samples. Observations beyond the last finite
    /// bucket report that bucket's bound.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn percentile(&self, p: f64) -> f64 {
        let total = self.latency_count.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }

        let threshold = ((p / 100.0) * total as f64).ceil().max(1.0) as u64;

        let mut cumulative = 0u64;
        for (bucket, bound) in BUCKET_BOUNDS_US.iter().enumerate() {
            cumulative += self.latency_buckets[bucket].load(Ordering::Relaxed);
            if cumulative >= threshold {
                return *bound as f64 / 1_000.0;
            }
        }

        // Overflow bucket: clamp to the last finite bound.
        BUCKET_BOUNDS_US[BUCKET_BOUNDS_US.len() - 1] as f64 / 1_000.0
    }

    /// Take a copy-on-read snapshot of every metric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let successful = self.collections_successful.load(Ordering::Relaxed);
        let failed = self.collections_failed.load(Ordering::Relaxed);
        let count = self.latency_count.load(Ordering::Relaxed);

        let min_us = self.latency_min_us.load(Ordering::Relaxed);
        let avg_ms = if count == 0 {
            0.0
        } else {
            self.latency_sum_us.load(Ordering::Relaxed) as f64 / count as f64 / 1_000.0
        };

        let errors_by_kind = self
            .errors_by_kind
            .read()
            .iter()
            .map(|(kind, counter)| (*kind, counter.load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            collections_total: successful + failed,
            collections_successful: successful,
            collections_failed: failed,
            avg_latency_ms: avg_ms,
            min_latency_ms: if min_us == u64::MAX {
                0.0
            } else {
                min_us as f64 / 1_000.0
            },
            max_latency_ms: self.latency_max_us.load(Ordering::Relaxed) as f64 / 1_000.0,
            p50_latency_ms: self.percentile(50.0),
            p95_latency_ms: self.percentile(95.0),
            p99_latency_ms: self.percentile(99.0),
            validators_processed: self.validators_processed.load(Ordering::Relaxed),
            snapshots_stored: self.snapshots_stored.load(Ordering::Relaxed),
            bytes_stored: self.bytes_stored.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            errors_by_kind,
            worker_count: self.worker_count.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }

    /// Errors recorded for one kind tag.
    #[must_use]
    pub fn errors_for(&self, kind: &str) -> u64 {
        self.errors_by_kind
            .read()
            .get(kind)
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
