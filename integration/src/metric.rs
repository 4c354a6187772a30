//! Metric emission.
//!
//! The substrate pushes [`Metric`]s to an optional [`MetricsObserver`];
//! with no observer installed every emission is a no-op. Independently of
//! the push stream, [`VenueMetrics`] maintains the per-venue aggregate
//! signals (request counters, latency stats, breaker state, rate-limit and
//! WebSocket counters) that drivers expose via their metrics accessors.

use crate::collection::FnvIndexMap;
use kestrel_markets::VenueId;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use smol_str::SmolStr;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Metric tag key-value pair.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Tag {
    pub key: SmolStr,
    pub value: SmolStr,
}

impl Tag {
    pub fn new(key: impl Into<SmolStr>, value: impl Into<SmolStr>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Metric field key-value pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub key: SmolStr,
    pub value: f64,
}

impl Field {
    pub fn new(key: impl Into<SmolStr>, value: f64) -> Self {
        Self { key: key.into(), value }
    }
}

/// A single observation pushed to the observer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: &'static str,
    /// Milliseconds since the Unix epoch.
    pub time: i64,
    pub tags: Vec<Tag>,
    pub fields: Vec<Field>,
}

/// Push-style sink for [`Metric`]s.
///
/// Implementations must be cheap and non-blocking; the substrate emits from
/// hot paths.
pub trait MetricsObserver: Send + Sync {
    fn record(&self, metric: Metric);
}

/// Circuit-breaker state encoded for the `circuit_breaker_state` gauge.
pub const BREAKER_GAUGE_CLOSED: u8 = 0;
pub const BREAKER_GAUGE_HALF_OPEN: u8 = 1;
pub const BREAKER_GAUGE_OPEN: u8 = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub max_ms: f64,
    pub sum_ms: f64,
    pub count: u64,
}

impl LatencyStats {
    fn observe(&mut self, latency_ms: f64) {
        if self.count == 0 || latency_ms < self.min_ms {
            self.min_ms = latency_ms;
        }
        if latency_ms > self.max_ms {
            self.max_ms = latency_ms;
        }
        self.sum_ms += latency_ms;
        self.count += 1;
    }

    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ms / self.count as f64
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
struct EndpointStats {
    requests: u64,
    successes: u64,
    failures: u64,
    latency: LatencyStats,
}

/// Per-endpoint counters in a [`MetricsSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointCounters {
    pub endpoint: SmolStr,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub latency: LatencyStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorCounter {
    pub endpoint: SmolStr,
    pub kind: SmolStr,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionCounter {
    pub from: &'static str,
    pub to: &'static str,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerCounters {
    /// Closed=0, HalfOpen=1, Open=2.
    pub state: u8,
    pub transitions: Vec<TransitionCounter>,
    pub successes: u64,
    pub failures: u64,
}

/// Point-in-time copy of a venue's aggregate signals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub venue: VenueId,
    pub requests: Vec<EndpointCounters>,
    pub errors: Vec<ErrorCounter>,
    pub rate_limit_hits: u64,
    pub ws_reconnects: u64,
    pub ws_dropped_events: Vec<(SmolStr, u64)>,
    pub breaker: BreakerCounters,
}

/// Aggregate signal store for one venue, shared by its rate limiter,
/// circuit breaker, HTTP client and WebSocket runtime.
pub struct VenueMetrics {
    venue: VenueId,
    observer: RwLock<Option<Arc<dyn MetricsObserver>>>,
    endpoints: Mutex<FnvIndexMap<SmolStr, EndpointStats>>,
    errors: Mutex<FnvIndexMap<(SmolStr, SmolStr), u64>>,
    rate_limit_hits: AtomicU64,
    ws_reconnects: AtomicU64,
    ws_dropped: Mutex<FnvIndexMap<SmolStr, u64>>,
    breaker_state: AtomicU8,
    breaker_transitions: Mutex<FnvIndexMap<(&'static str, &'static str), u64>>,
    breaker_successes: AtomicU64,
    breaker_failures: AtomicU64,
}

impl fmt::Debug for VenueMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VenueMetrics")
            .field("venue", &self.venue)
            .field("observer", &self.observer.read().is_some())
            .finish()
    }
}

impl VenueMetrics {
    pub fn new(venue: VenueId) -> Self {
        Self {
            venue,
            observer: RwLock::new(None),
            endpoints: Mutex::new(FnvIndexMap::default()),
            errors: Mutex::new(FnvIndexMap::default()),
            rate_limit_hits: AtomicU64::new(0),
            ws_reconnects: AtomicU64::new(0),
            ws_dropped: Mutex::new(FnvIndexMap::default()),
            breaker_state: AtomicU8::new(BREAKER_GAUGE_CLOSED),
            breaker_transitions: Mutex::new(FnvIndexMap::default()),
            breaker_successes: AtomicU64::new(0),
            breaker_failures: AtomicU64::new(0),
        }
    }

    pub fn venue(&self) -> VenueId {
        self.venue
    }

    pub fn set_observer(&self, observer: Arc<dyn MetricsObserver>) {
        *self.observer.write() = Some(observer);
    }

    fn emit(&self, name: &'static str, tags: Vec<Tag>, fields: Vec<Field>) {
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            let mut tags = tags;
            tags.push(Tag::new("venue", self.venue.as_str()));
            observer.record(Metric {
                name,
                time: chrono::Utc::now().timestamp_millis(),
                tags,
                fields,
            });
        }
    }

    /// Record one completed HTTP attempt.
    pub fn record_request(&self, endpoint: &str, status: u16, latency_ms: f64, ok: bool) {
        {
            let mut endpoints = self.endpoints.lock();
            let stats = endpoints.entry(SmolStr::new(endpoint)).or_default();
            stats.requests += 1;
            if ok {
                stats.successes += 1;
            } else {
                stats.failures += 1;
            }
            stats.latency.observe(latency_ms);
        }
        self.emit(
            "requests_total",
            vec![
                Tag::new("endpoint", endpoint),
                Tag::new("status", status.to_string()),
            ],
            vec![Field::new("count", 1.0)],
        );
        self.emit(
            "request_latency_ms",
            vec![Tag::new("endpoint", endpoint)],
            vec![Field::new("latency", latency_ms)],
        );
    }

    /// Record a typed error produced by the HTTP pipeline.
    pub fn record_error(&self, endpoint: &str, kind_code: &str) {
        {
            let mut errors = self.errors.lock();
            *errors
                .entry((SmolStr::new(endpoint), SmolStr::new(kind_code)))
                .or_insert(0) += 1;
        }
        self.emit(
            "request_errors_total",
            vec![Tag::new("endpoint", endpoint), Tag::new("kind", kind_code)],
            vec![Field::new("count", 1.0)],
        );
    }

    /// Record that an acquire had to queue behind the token bucket.
    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        self.emit("rate_limit_hits_total", vec![], vec![Field::new("count", 1.0)]);
    }

    pub fn rate_limit_hits(&self) -> u64 {
        self.rate_limit_hits.load(Ordering::Relaxed)
    }

    pub fn record_ws_reconnect(&self) {
        self.ws_reconnects.fetch_add(1, Ordering::Relaxed);
        self.emit("ws_reconnects_total", vec![], vec![Field::new("count", 1.0)]);
    }

    pub fn record_ws_dropped(&self, channel: &str) {
        {
            let mut dropped = self.ws_dropped.lock();
            *dropped.entry(SmolStr::new(channel)).or_insert(0) += 1;
        }
        self.emit(
            "ws_dropped_events_total",
            vec![Tag::new("channel", channel)],
            vec![Field::new("count", 1.0)],
        );
    }

    /// Record a circuit-breaker state change.
    pub fn record_breaker_transition(&self, from: &'static str, to: &'static str, gauge: u8) {
        self.breaker_state.store(gauge, Ordering::Relaxed);
        {
            let mut transitions = self.breaker_transitions.lock();
            *transitions.entry((from, to)).or_insert(0) += 1;
        }
        self.emit(
            "circuit_breaker_transitions_total",
            vec![Tag::new("from", from), Tag::new("to", to)],
            vec![Field::new("count", 1.0)],
        );
        self.emit(
            "circuit_breaker_state",
            vec![],
            vec![Field::new("state", gauge as f64)],
        );
    }

    pub fn record_breaker_success(&self) {
        self.breaker_successes.fetch_add(1, Ordering::Relaxed);
        self.emit(
            "circuit_breaker_success_total",
            vec![],
            vec![Field::new("count", 1.0)],
        );
    }

    pub fn record_breaker_failure(&self) {
        self.breaker_failures.fetch_add(1, Ordering::Relaxed);
        self.emit(
            "circuit_breaker_failure_total",
            vec![],
            vec![Field::new("count", 1.0)],
        );
    }

    pub fn breaker_state_gauge(&self) -> u8 {
        self.breaker_state.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self
            .endpoints
            .lock()
            .iter()
            .map(|(endpoint, stats)| EndpointCounters {
                endpoint: endpoint.clone(),
                requests: stats.requests,
                successes: stats.successes,
                failures: stats.failures,
                latency: stats.latency,
            })
            .collect();
        let errors = self
            .errors
            .lock()
            .iter()
            .map(|((endpoint, kind), count)| ErrorCounter {
                endpoint: endpoint.clone(),
                kind: kind.clone(),
                count: *count,
            })
            .collect();
        let transitions = self
            .breaker_transitions
            .lock()
            .iter()
            .map(|((from, to), count)| TransitionCounter { from, to, count: *count })
            .collect();

        MetricsSnapshot {
            venue: self.venue,
            requests,
            errors,
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            ws_reconnects: self.ws_reconnects.load(Ordering::Relaxed),
            ws_dropped_events: self
                .ws_dropped
                .lock()
                .iter()
                .map(|(channel, count)| (channel.clone(), *count))
                .collect(),
            breaker: BreakerCounters {
                state: self.breaker_state.load(Ordering::Relaxed),
                transitions,
                successes: self.breaker_successes.load(Ordering::Relaxed),
                failures: self.breaker_failures.load(Ordering::Relaxed),
            },
        }
    }

    /// Zero every counter. The breaker state gauge is left as-is since it
    /// mirrors live breaker state rather than accumulated history.
    pub fn reset(&self) {
        self.endpoints.lock().clear();
        self.errors.lock().clear();
        self.rate_limit_hits.store(0, Ordering::Relaxed);
        self.ws_reconnects.store(0, Ordering::Relaxed);
        self.ws_dropped.lock().clear();
        self.breaker_transitions.lock().clear();
        self.breaker_successes.store(0, Ordering::Relaxed);
        self.breaker_failures.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    #[derive(Default)]
    struct Capture(PlMutex<Vec<Metric>>);

    impl MetricsObserver for Capture {
        fn record(&self, metric: Metric) {
            self.0.lock().push(metric);
        }
    }

    #[test]
    fn test_request_counters_and_latency() {
        let metrics = VenueMetrics::new(VenueId::Mock);
        metrics.record_request("ticker", 200, 12.0, true);
        metrics.record_request("ticker", 200, 8.0, true);
        metrics.record_request("ticker", 503, 30.0, false);

        let snapshot = metrics.snapshot();
        let ticker = &snapshot.requests[0];
        assert_eq!(ticker.requests, 3);
        assert_eq!(ticker.successes, 2);
        assert_eq!(ticker.failures, 1);
        assert_eq!(ticker.latency.min_ms, 8.0);
        assert_eq!(ticker.latency.max_ms, 30.0);
        assert_eq!(ticker.latency.count, 3);
        assert!((ticker.latency.mean_ms() - 50.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_emission_is_noop_without_observer() {
        let metrics = VenueMetrics::new(VenueId::Mock);
        // Must not panic or block.
        metrics.record_rate_limit_hit();
        assert_eq!(metrics.rate_limit_hits(), 1);
    }

    #[test]
    fn test_observer_receives_tagged_metrics() {
        let metrics = VenueMetrics::new(VenueId::Mock);
        let capture = Arc::new(Capture::default());
        metrics.set_observer(capture.clone());

        metrics.record_breaker_transition("closed", "open", BREAKER_GAUGE_OPEN);

        let recorded = capture.0.lock();
        assert!(recorded
            .iter()
            .any(|m| m.name == "circuit_breaker_transitions_total"));
        assert!(recorded
            .iter()
            .all(|m| m.tags.iter().any(|t| t.key == "venue" && t.value == "mock")));
        assert_eq!(metrics.breaker_state_gauge(), BREAKER_GAUGE_OPEN);
    }

    #[test]
    fn test_reset_clears_counters() {
        let metrics = VenueMetrics::new(VenueId::Mock);
        metrics.record_request("book", 200, 1.0, true);
        metrics.record_ws_dropped("orderbook:BTC");
        metrics.reset();

        let snapshot = metrics.snapshot();
        assert!(snapshot.requests.is_empty());
        assert!(snapshot.ws_dropped_events.is_empty());
        assert_eq!(snapshot.rate_limit_hits, 0);
    }
}
