//! `MetricsCore` (§4.9, spec C11): in-memory request counters, latency
//! histograms, periodic resource samples, and a retained time-series.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use meridian_objects::model::Bucket;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const DEFAULT_RETENTION_DAYS: i64 = 7;
const DEFAULT_SNAPSHOT_INTERVAL_SECS: i64 = 60;

/// Upper bound (inclusive) in milliseconds of each latency bucket.
const LATENCY_BUCKET_BOUNDS_MS: [u64; 8] = [1, 5, 10, 50, 100, 500, 1_000, 5_000];

/// A point-in-time CPU/memory/disk reading. Actual collection is the
/// caller's job via [`ResourceSampler`] -- this crate only shapes and
/// retains the result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
}

/// Capability boundary for reading host resource usage (analogous to
/// `meridian_blob::BlobBackend`): this crate has no business reading
/// `/proc` or shelling out to a system library itself.
pub trait ResourceSampler: Send + Sync {
    /// Take one reading. Should be cheap enough to call once per tick.
    fn sample(&self) -> ResourceSample;
}

/// A [`ResourceSampler`] that always reports zero, for tests and for
/// deployments that don't wire in a real one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResourceSampler;

impl ResourceSampler for NullResourceSampler {
    fn sample(&self) -> ResourceSample {
        ResourceSample {
            cpu_percent: 0.0,
            memory_bytes: 0,
            disk_bytes: 0,
        }
    }
}

/// One retained point in the time series (§4.9: "snapshots every 60s").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub total_requests: u64,
    pub total_errors: u64,
    /// `(bucket upper bound ms, count)` pairs, in ascending order.
    pub latency_histogram: Vec<(u64, u64)>,
    pub resources: ResourceSample,
}

/// Derived, read-only view of a bucket's live counters (§4.9: "Bucket-level
/// metrics are derived from bucket counter fields, not recomputed by
/// scanning objects").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BucketMetrics {
    pub object_count: u64,
    pub total_size: u64,
}

#[must_use]
pub fn bucket_metrics(bucket: &Bucket) -> BucketMetrics {
    BucketMetrics {
        object_count: bucket.counters.object_count,
        total_size: bucket.counters.total_size,
    }
}

struct LatencyHistogram {
    buckets: [AtomicU64; LATENCY_BUCKET_BOUNDS_MS.len()],
    overflow: AtomicU64,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            buckets: Default::default(),
            overflow: AtomicU64::new(0),
        }
    }

    fn record(&self, latency_ms: u64) {
        for (bound, counter) in LATENCY_BUCKET_BOUNDS_MS.iter().zip(&self.buckets) {
            if latency_ms <= *bound {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.overflow.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Vec<(u64, u64)> {
        let mut out: Vec<(u64, u64)> = LATENCY_BUCKET_BOUNDS_MS
            .iter()
            .zip(&self.buckets)
            .map(|(bound, counter)| (*bound, counter.load(Ordering::Relaxed)))
            .collect();
        out.push((u64::MAX, self.overflow.load(Ordering::Relaxed)));
        out
    }
}

/// Process-wide request counters, latency histogram, and retained
/// time-series snapshots (spec C11).
pub struct MetricsCore {
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    latency: LatencyHistogram,
    snapshots: Mutex<Vec<MetricsSnapshot>>,
    retention: Duration,
    last_snapshot_at: Mutex<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for MetricsCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCore")
            .field("total_requests", &self.total_requests.load(Ordering::Relaxed))
            .field("total_errors", &self.total_errors.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MetricsCore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(Duration::days(DEFAULT_RETENTION_DAYS))
    }

    #[must_use]
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            latency: LatencyHistogram::new(),
            snapshots: Mutex::new(Vec::new()),
            retention,
            last_snapshot_at: Mutex::new(None),
        }
    }

    /// Record one completed request (§4.9).
    pub fn record_request(&self, latency_ms: u64, is_error: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.latency.record(latency_ms);
    }

    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    /// Take and retain a snapshot if at least one snapshot interval has
    /// elapsed since the last one, pruning anything past `retention`.
    /// Called once per tick by whatever owns the tick loop (the lifecycle
    /// worker, or a caller's own scheduler); this crate has no scheduler of
    /// its own since a tick here has no sweeping side effect to sequence.
    pub fn maybe_snapshot(&self, now: DateTime<Utc>, sampler: &dyn ResourceSampler) -> Option<MetricsSnapshot> {
        let mut last = self.last_snapshot_at.lock();
        if let Some(previous) = *last {
            if now - previous < Duration::seconds(DEFAULT_SNAPSHOT_INTERVAL_SECS) {
                return None;
            }
        }
        *last = Some(now);
        drop(last);

        let snapshot = MetricsSnapshot {
            taken_at: now,
            total_requests: self.total_requests(),
            total_errors: self.total_errors(),
            latency_histogram: self.latency.snapshot(),
            resources: sampler.sample(),
        };

        let mut snapshots = self.snapshots.lock();
        snapshots.push(snapshot.clone());
        let cutoff = now - self.retention;
        snapshots.retain(|s| s.taken_at >= cutoff);
        Some(snapshot)
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<MetricsSnapshot> {
        self.snapshots.lock().clone()
    }
}

impl Default for MetricsCore {
    fn default() -> Self {
        Self::new()
    }
}
