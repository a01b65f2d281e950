//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention with the
//! frame loop. All counter updates are lock-free; reporting swaps the periodic
//! counters to get a consistent snapshot.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries, shared by the µs and ms histograms
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
pub const METRICS_BUCKET_BOUNDS: [u64; 10] =
    [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a value using binary search
#[inline]
fn bucket_index(value: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < value)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Why a dispatch did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchFailure {
    Auth,
    Action,
    WorkerFault,
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Frames observed by the voter (monotonic)
    frames_total: AtomicU64,
    /// Frames since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Frames where at least one point was inside a zone (monotonic)
    frames_occupied_total: AtomicU64,
    /// Debounce threshold reached (monotonic)
    triggers_total: AtomicU64,
    /// Triggers rejected by a held cooldown (monotonic)
    triggers_suppressed: AtomicU64,
    /// Tasks accepted by the dispatch queue (monotonic)
    dispatch_enqueued: AtomicU64,
    /// Tasks refused because the queue was full or closed (monotonic)
    dispatch_rejected: AtomicU64,
    /// Remote sequences that completed (monotonic)
    dispatch_succeeded: AtomicU64,
    /// Sequences that failed at login (monotonic)
    dispatch_auth_failed: AtomicU64,
    /// Sequences that failed at the action call (monotonic)
    dispatch_action_failed: AtomicU64,
    /// Panics caught in the worker (monotonic)
    worker_faults: AtomicU64,
    /// Queue delay histogram, µs (reset on report)
    queue_delay_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    queue_delay_sum_us: AtomicU64,
    queue_delay_max_us: AtomicU64,
    /// Remote sequence latency histogram, ms (reset on report)
    dispatch_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    dispatch_latency_sum_ms: AtomicU64,
    dispatches_since_report: AtomicU64,
    /// Tasks waiting in the dispatch queue
    queue_depth: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            frames_occupied_total: AtomicU64::new(0),
            triggers_total: AtomicU64::new(0),
            triggers_suppressed: AtomicU64::new(0),
            dispatch_enqueued: AtomicU64::new(0),
            dispatch_rejected: AtomicU64::new(0),
            dispatch_succeeded: AtomicU64::new(0),
            dispatch_auth_failed: AtomicU64::new(0),
            dispatch_action_failed: AtomicU64::new(0),
            worker_faults: AtomicU64::new(0),
            queue_delay_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            queue_delay_sum_us: AtomicU64::new(0),
            queue_delay_max_us: AtomicU64::new(0),
            dispatch_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            dispatch_latency_sum_ms: AtomicU64::new(0),
            dispatches_since_report: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record one observed frame
    #[inline]
    pub fn record_frame(&self, occupied: bool) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        if occupied {
            self.frames_occupied_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_trigger(&self) {
        self.triggers_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_trigger_suppressed(&self) {
        self.triggers_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a task about to be offered to the queue.
    /// Must be followed by `record_enqueued` or `record_rejected`.
    #[inline]
    pub fn record_queue_push(&self) {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enqueued(&self) {
        self.dispatch_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Task refused by the queue; undoes `record_queue_push`
    #[inline]
    pub fn record_rejected(&self) {
        self.dispatch_rejected.fetch_add(1, Ordering::Relaxed);
        self.decrement_queue_depth();
    }

    #[inline]
    fn decrement_queue_depth(&self) {
        // Saturating; depth is advisory
        let _ = self
            .queue_depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| Some(d.saturating_sub(1)));
    }

    /// Record the worker picking a task up after `delay_us` in the queue
    #[inline]
    pub fn record_dequeued(&self, delay_us: u64) {
        self.decrement_queue_depth();
        self.queue_delay_buckets[bucket_index(delay_us)].fetch_add(1, Ordering::Relaxed);
        self.queue_delay_sum_us.fetch_add(delay_us, Ordering::Relaxed);
        update_atomic_max(&self.queue_delay_max_us, delay_us);
    }

    /// Record a completed remote sequence and its latency
    #[inline]
    pub fn record_dispatch_success(&self, latency_ms: u64) {
        self.dispatch_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_dispatch_latency(latency_ms);
    }

    /// Record a failed remote sequence
    #[inline]
    pub fn record_dispatch_failure(&self, failure: DispatchFailure, latency_ms: u64) {
        let counter = match failure {
            DispatchFailure::Auth => &self.dispatch_auth_failed,
            DispatchFailure::Action => &self.dispatch_action_failed,
            DispatchFailure::WorkerFault => &self.worker_faults,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.record_dispatch_latency(latency_ms);
    }

    #[inline]
    fn record_dispatch_latency(&self, latency_ms: u64) {
        self.dispatches_since_report.fetch_add(1, Ordering::Relaxed);
        self.dispatch_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        self.dispatch_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    #[inline]
    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn triggers_total(&self) -> u64 {
        self.triggers_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn triggers_suppressed(&self) -> u64 {
        self.triggers_suppressed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dispatch_enqueued(&self) -> u64 {
        self.dispatch_enqueued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dispatch_rejected(&self) -> u64 {
        self.dispatch_rejected.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dispatch_succeeded(&self) -> u64 {
        self.dispatch_succeeded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dispatch_failed(&self, failure: DispatchFailure) -> u64 {
        match failure {
            DispatchFailure::Auth => self.dispatch_auth_failed.load(Ordering::Relaxed),
            DispatchFailure::Action => self.dispatch_action_failed.load(Ordering::Relaxed),
            DispatchFailure::WorkerFault => self.worker_faults.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn queue_depth(&self) -> u64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Snapshot monotonic counters without resetting anything
    pub fn totals(&self) -> MetricsTotals {
        MetricsTotals {
            frames_total: self.frames_total(),
            frames_occupied_total: self.frames_occupied_total.load(Ordering::Relaxed),
            triggers_total: self.triggers_total(),
            triggers_suppressed: self.triggers_suppressed(),
            dispatch_enqueued: self.dispatch_enqueued(),
            dispatch_rejected: self.dispatch_rejected(),
            dispatch_succeeded: self.dispatch_succeeded(),
            dispatch_auth_failed: self.dispatch_failed(DispatchFailure::Auth),
            dispatch_action_failed: self.dispatch_failed(DispatchFailure::Action),
            worker_faults: self.dispatch_failed(DispatchFailure::WorkerFault),
            queue_depth: self.queue_depth(),
        }
    }

    /// Generate a summary and reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let frames_count = self.frames_since_report.swap(0, Ordering::Relaxed);

        let queue_delay_buckets = swap_buckets(&self.queue_delay_buckets);
        let queue_delay_sum = self.queue_delay_sum_us.swap(0, Ordering::Relaxed);
        let queue_delay_max = self.queue_delay_max_us.swap(0, Ordering::Relaxed);

        let latency_buckets = swap_buckets(&self.dispatch_latency_buckets);
        let latency_sum = self.dispatch_latency_sum_ms.swap(0, Ordering::Relaxed);
        let dispatch_count = self.dispatches_since_report.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let frames_per_sec = if elapsed.as_secs_f64() > 0.0 {
            frames_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let dequeued: u64 = queue_delay_buckets.iter().sum();
        let queue_delay_avg_us = if dequeued > 0 { queue_delay_sum / dequeued } else { 0 };
        let dispatch_avg_ms = if dispatch_count > 0 { latency_sum / dispatch_count } else { 0 };

        MetricsSummary {
            totals: self.totals(),
            frames_per_sec,
            queue_delay_avg_us,
            queue_delay_max_us: queue_delay_max,
            queue_delay_p99_us: percentile_from_buckets(&queue_delay_buckets, 0.99),
            dispatch_avg_ms,
            dispatch_p99_ms: percentile_from_buckets(&latency_buckets, 0.99),
        }
    }
}

/// Monotonic counters at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsTotals {
    pub frames_total: u64,
    pub frames_occupied_total: u64,
    pub triggers_total: u64,
    pub triggers_suppressed: u64,
    pub dispatch_enqueued: u64,
    pub dispatch_rejected: u64,
    pub dispatch_succeeded: u64,
    pub dispatch_auth_failed: u64,
    pub dispatch_action_failed: u64,
    pub worker_faults: u64,
    pub queue_depth: u64,
}

/// Periodic summary produced by `Metrics::report`
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub totals: MetricsTotals,
    pub frames_per_sec: f64,
    pub queue_delay_avg_us: u64,
    pub queue_delay_max_us: u64,
    pub queue_delay_p99_us: u64,
    pub dispatch_avg_ms: u64,
    pub dispatch_p99_ms: u64,
}

impl MetricsSummary {
    /// Log summary at INFO level
    pub fn log(&self) {
        let t = &self.totals;
        info!(
            frames_total = %t.frames_total,
            frames_per_sec = format!("{:.1}", self.frames_per_sec),
            triggers = %t.triggers_total,
            suppressed = %t.triggers_suppressed,
            enqueued = %t.dispatch_enqueued,
            rejected = %t.dispatch_rejected,
            succeeded = %t.dispatch_succeeded,
            auth_failed = %t.dispatch_auth_failed,
            action_failed = %t.dispatch_action_failed,
            worker_faults = %t.worker_faults,
            queue_depth = %t.queue_depth,
            queue_delay_p99_us = %self.queue_delay_p99_us,
            dispatch_avg_ms = %self.dispatch_avg_ms,
            "metrics"
        );
    }
}
