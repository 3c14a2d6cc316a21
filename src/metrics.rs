//! Usage metrics
//!
//! Thread-safe counters plus two rolling-window timestamp buffers (served
//! requests and upstream calls) used to compute requests-per-minute. The
//! buffers are bounded ring buffers: once capacity is reached the oldest
//! entries are dropped, which only affects rate-estimate precision during
//! extreme bursts, never the correctness of the totals.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum timestamps kept per rolling window (covers ~17 min at 100 req/s).
const MAX_TIMESTAMPS: usize = 100_000;

/// Spreadsheet ids longer than this are truncated in per-sheet counts.
const SHEET_KEY_LEN: usize = 12;

/// RPM window
const RPM_WINDOW: Duration = Duration::from_secs(60);

/// Process-wide usage metrics, updated by every request path.
pub struct UsageMetrics {
    inner: Mutex<MetricsInner>,
}

struct MetricsInner {
    upstream_requests: u64,
    cache_hits: u64,
    cache_misses: u64,
    errors: u64,
    per_sheet: HashMap<String, u64>,
    request_times: VecDeque<Instant>,
    upstream_times: VecDeque<Instant>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl MetricsInner {
    fn new() -> Self {
        Self {
            upstream_requests: 0,
            cache_hits: 0,
            cache_misses: 0,
            errors: 0,
            per_sheet: HashMap::new(),
            request_times: VecDeque::with_capacity(1024),
            upstream_times: VecDeque::with_capacity(1024),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }
}

/// Point-in-time export of the metrics state.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub started_at: String,
    pub upstream_api_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_requests: u64,
    pub cache_hit_rate_percent: f64,
    pub errors: u64,
    pub server_rpm: usize,
    pub upstream_rpm: usize,
    pub requests_per_sheet: HashMap<String, u64>,
}

impl UsageMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsInner::new()),
        }
    }

    /// Record one upstream API call for a spreadsheet.
    pub fn record_upstream_call(&self, spreadsheet_id: &str) {
        let mut inner = self.lock();
        inner.upstream_requests += 1;
        push_bounded(&mut inner.upstream_times, Instant::now());

        let key = truncate_sheet_key(spreadsheet_id);
        *inner.per_sheet.entry(key).or_insert(0) += 1;
    }

    /// Record a request served from cache.
    pub fn record_cache_hit(&self) {
        let mut inner = self.lock();
        inner.cache_hits += 1;
        push_bounded(&mut inner.request_times, Instant::now());
    }

    /// Record a request that missed the cache.
    pub fn record_cache_miss(&self) {
        let mut inner = self.lock();
        inner.cache_misses += 1;
        push_bounded(&mut inner.request_times, Instant::now());
    }

    pub fn record_error(&self) {
        self.lock().errors += 1;
    }

    /// Export current counters and rolling-window rates.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let total_requests = inner.cache_hits + inner.cache_misses;
        let hit_rate = inner.cache_hits as f64 / total_requests.max(1) as f64 * 100.0;

        MetricsSnapshot {
            uptime_seconds: inner.started.elapsed().as_secs(),
            started_at: inner.started_at.to_rfc3339(),
            upstream_api_requests: inner.upstream_requests,
            cache_hits: inner.cache_hits,
            cache_misses: inner.cache_misses,
            total_requests,
            cache_hit_rate_percent: (hit_rate * 10.0).round() / 10.0,
            errors: inner.errors,
            server_rpm: count_in_window(&inner.request_times, RPM_WINDOW),
            upstream_rpm: count_in_window(&inner.upstream_times, RPM_WINDOW),
            requests_per_sheet: inner.per_sheet.clone(),
        }
    }

    /// Reset all counters and buffers (tests and operators).
    pub fn reset(&self) {
        *self.lock() = MetricsInner::new();
    }

    fn lock(&self) -> MutexGuard<'_, MetricsInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for UsageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded(buffer: &mut VecDeque<Instant>, timestamp: Instant) {
    if buffer.len() == MAX_TIMESTAMPS {
        buffer.pop_front();
    }
    buffer.push_back(timestamp);
}

/// Count timestamps newer than now minus `window`.
///
/// Entries are time-ordered, so scanning newest-to-oldest and stopping at
/// the first stale entry is O(window size), not O(buffer size).
fn count_in_window(timestamps: &VecDeque<Instant>, window: Duration) -> usize {
    let now = Instant::now();
    timestamps
        .iter()
        .rev()
        .take_while(|t| now.duration_since(**t) < window)
        .count()
}

fn truncate_sheet_key(spreadsheet_id: &str) -> String {
    if spreadsheet_id.len() > SHEET_KEY_LEN {
        let prefix: String = spreadsheet_id.chars().take(SHEET_KEY_LEN).collect();
        format!("{prefix}...")
    } else {
        spreadsheet_id.to_string()
    }
}
