use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use http::StatusCode;

use crate::error::Error;
use crate::request::RequestId;
use crate::util::lock_unpoisoned;

/// Timing of one logical call, from the first send to completion.
///
/// Durations whose end point has not been recorded yet are measured against
/// the current instant.
#[derive(Clone, Copy, Debug)]
pub struct RequestMetrics {
    request_start: Instant,
    request_end: Option<Instant>,
    response_start: Option<Instant>,
    response_end: Option<Instant>,
}

impl RequestMetrics {
    pub fn request_start(&self) -> Instant {
        self.request_start
    }

    pub fn request_end(&self) -> Option<Instant> {
        self.request_end
    }

    pub fn response_start(&self) -> Option<Instant> {
        self.response_start
    }

    pub fn response_end(&self) -> Option<Instant> {
        self.response_end
    }

    pub fn total_duration(&self) -> Duration {
        self.response_end
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.request_start)
    }

    pub fn request_duration(&self) -> Duration {
        self.response_start
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.request_start)
    }

    pub fn response_duration(&self) -> Option<Duration> {
        let start = self.response_start?;
        let end = self.response_end?;
        Some(end.saturating_duration_since(start))
    }

    pub fn is_finished(&self) -> bool {
        self.request_end.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct MetricsSnapshot {
    pub requests_started: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub retries: u64,
    pub in_flight: u64,
    pub latency_samples: u64,
    pub latency_total_ms: u64,
    pub latency_avg_ms: f64,
    pub status_counts: BTreeMap<u16, u64>,
    pub error_counts: BTreeMap<String, u64>,
}

#[derive(Clone, Copy, Debug)]
struct ActiveRecord {
    start: Instant,
    response_start: Option<Instant>,
}

/// Per-request timings keyed by [`RequestId`], plus client-wide counters.
///
/// Cloning is cheap and every clone shares the same state. The keyed map is
/// only locked for inserts, lookups and removals, never across an await.
#[derive(Clone, Debug, Default)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    active: Mutex<HashMap<RequestId, ActiveRecord>>,
    requests_started: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    retries: AtomicU64,
    in_flight: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_samples: AtomicU64,
    status_counts: Mutex<BTreeMap<u16, u64>>,
    error_counts: Mutex<BTreeMap<String, u64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts timing `key`. Starting a key that is already active restarts it.
    pub fn record_start(&self, key: RequestId) {
        let previous = lock_unpoisoned(&self.inner.active).insert(
            key,
            ActiveRecord {
                start: Instant::now(),
                response_start: None,
            },
        );
        self.inner.requests_started.fetch_add(1, Ordering::Relaxed);
        if previous.is_none() {
            self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Marks the instant the first byte of a response was available.
    pub fn record_response_start(&self, key: RequestId) {
        if let Some(record) = lock_unpoisoned(&self.inner.active).get_mut(&key) {
            record.response_start.get_or_insert_with(Instant::now);
        }
    }

    /// Finalizes and forgets `key`. Returns `None` for keys that were never
    /// started or were already finalized.
    pub fn record_end(&self, key: RequestId) -> Option<RequestMetrics> {
        let record = lock_unpoisoned(&self.inner.active).remove(&key)?;
        self.inner.in_flight.fetch_sub(1, Ordering::Relaxed);

        let end = Instant::now();
        Some(RequestMetrics {
            request_start: record.start,
            request_end: Some(end),
            response_start: Some(record.response_start.unwrap_or(end)),
            response_end: Some(end),
        })
    }

    /// Peeks at an unfinished record without removing it.
    pub fn in_flight(&self, key: RequestId) -> Option<RequestMetrics> {
        let record = *lock_unpoisoned(&self.inner.active).get(&key)?;
        Some(RequestMetrics {
            request_start: record.start,
            request_end: None,
            response_start: record.response_start,
            response_end: None,
        })
    }

    pub fn active_len(&self) -> usize {
        lock_unpoisoned(&self.inner.active).len()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency_samples = self.inner.latency_samples.load(Ordering::Relaxed);
        let latency_total_ms = self.inner.latency_total_ms.load(Ordering::Relaxed);
        let latency_avg_ms = if latency_samples == 0 {
            0.0
        } else {
            latency_total_ms as f64 / latency_samples as f64
        };

        MetricsSnapshot {
            requests_started: self.inner.requests_started.load(Ordering::Relaxed),
            requests_succeeded: self.inner.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.inner.requests_failed.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            latency_samples,
            latency_total_ms,
            latency_avg_ms,
            status_counts: lock_unpoisoned(&self.inner.status_counts).clone(),
            error_counts: lock_unpoisoned(&self.inner.error_counts).clone(),
        }
    }

    pub(crate) fn track(&self, key: RequestId) -> MetricsGuard {
        self.record_start(key);
        MetricsGuard {
            collector: self.clone(),
            key,
            armed: true,
        }
    }

    pub(crate) fn record_retry(&self) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_succeeded(&self, status: StatusCode, latency: Duration) {
        self.inner.requests_succeeded.fetch_add(1, Ordering::Relaxed);
        self.add_status_count(status.as_u16());
        self.record_latency(latency);
    }

    pub(crate) fn record_failed(&self, error: &Error, latency: Duration) {
        self.inner.requests_failed.fetch_add(1, Ordering::Relaxed);
        if let Some(status) = error.status() {
            self.add_status_count(status);
        }
        self.add_error_count(error.metrics_key());
        self.record_latency(latency);
    }

    fn record_latency(&self, latency: Duration) {
        self.inner.latency_samples.fetch_add(1, Ordering::Relaxed);
        self.inner.latency_total_ms.fetch_add(
            latency.as_millis().min(u64::MAX as u128) as u64,
            Ordering::Relaxed,
        );
    }

    fn add_status_count(&self, status: u16) {
        let mut status_counts = lock_unpoisoned(&self.inner.status_counts);
        *status_counts.entry(status).or_insert(0) += 1;
    }

    fn add_error_count(&self, error_key: String) {
        let mut error_counts = lock_unpoisoned(&self.inner.error_counts);
        *error_counts.entry(error_key).or_insert(0) += 1;
    }
}

/// Owns one active entry; dropping it without [`finish`](Self::finish)
/// discards the entry so cancelled calls leave nothing behind.
pub(crate) struct MetricsGuard {
    collector: MetricsCollector,
    key: RequestId,
    armed: bool,
}

impl MetricsGuard {
    pub(crate) fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    pub(crate) fn record_response_start(&self) {
        self.collector.record_response_start(self.key);
    }

    pub(crate) fn finish(mut self) -> Option<RequestMetrics> {
        self.armed = false;
        self.collector.record_end(self.key)
    }
}

impl Drop for MetricsGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.collector.record_end(self.key);
        }
    }
}
