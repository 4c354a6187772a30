//! Weighted token-bucket rate limiter with FIFO queueing.
//!
//! A bucket holds up to `max_tokens` tokens and refills `refill_rate`
//! tokens per `window`. Each acquire costs the endpoint's configured
//! weight (default 1). Requests that do not fit are queued in strict FIFO
//! order: the head waiter blocks the queue even if later, lighter waiters
//! would fit. A background processor polls at most every 100 ms until the
//! next refill makes the head request feasible.

use crate::collection::FnvIndexMap;
use crate::metric::VenueMetrics;
use kestrel_markets::{ErrorKind, VenueError, VenueResult};
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tracing::debug;

/// Maximum interval between queue-processor wakeups.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Bucket capacity.
    pub max_tokens: u32,
    /// Refill window.
    pub window: Duration,
    /// Tokens restored per elapsed window. Defaults to `max_tokens`.
    pub refill_rate: u32,
    /// Per-endpoint token costs; endpoints not listed cost 1.
    pub weights: FnvIndexMap<SmolStr, u32>,
}

impl RateLimitConfig {
    pub fn new(max_tokens: u32, window: Duration) -> Self {
        Self {
            max_tokens,
            window,
            refill_rate: max_tokens,
            weights: FnvIndexMap::default(),
        }
    }

    pub fn with_refill_rate(mut self, refill_rate: u32) -> Self {
        self.refill_rate = refill_rate;
        self
    }

    pub fn with_weight(mut self, endpoint: impl Into<SmolStr>, cost: u32) -> Self {
        self.weights.insert(endpoint.into(), cost);
        self
    }
}

fn destroyed_error() -> VenueError {
    VenueError::new(ErrorKind::Unknown, "rate limiter destroyed")
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl Bucket {
    /// Window-quantised refill: whole elapsed windows restore
    /// `refill_rate` tokens each, and `last_refill` keeps the remainder so
    /// partial windows are never lost.
    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed < config.window || config.window.is_zero() {
            return;
        }
        let window_nanos = config.window.as_nanos();
        let periods = (elapsed.as_nanos() / window_nanos) as u32;
        let remainder = Duration::from_nanos((elapsed.as_nanos() % window_nanos) as u64);
        self.tokens = self
            .tokens
            .saturating_add(periods.saturating_mul(config.refill_rate))
            .min(config.max_tokens);
        self.last_refill = now - remainder;
    }
}

struct Waiter {
    weight: u32,
    tx: oneshot::Sender<VenueResult<()>>,
}

struct State {
    bucket: Bucket,
    queue: VecDeque<Waiter>,
    destroyed: bool,
    processor: Option<tokio::task::JoinHandle<()>>,
}

struct Inner {
    config: RateLimitConfig,
    state: Mutex<State>,
    notify: Notify,
    metrics: Option<Arc<VenueMetrics>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.state.lock().processor.take() {
            handle.abort();
        }
    }
}

/// Weighted token-bucket rate limiter shared by all concurrent callers of
/// one driver.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RateLimiter")
            .field("max_tokens", &self.inner.config.max_tokens)
            .field("tokens", &state.bucket.tokens)
            .field("queued", &state.queue.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_metrics(config, None)
    }

    pub fn with_metrics(config: RateLimitConfig, metrics: Option<Arc<VenueMetrics>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    bucket: Bucket {
                        tokens: config.max_tokens,
                        last_refill: Instant::now(),
                    },
                    queue: VecDeque::new(),
                    destroyed: false,
                    processor: None,
                }),
                config,
                notify: Notify::new(),
                metrics,
            }),
        }
    }

    fn resolve_weight(&self, endpoint: Option<&str>, weight: Option<u32>) -> u32 {
        let config = &self.inner.config;
        let cost = weight
            .or_else(|| {
                endpoint.and_then(|endpoint| config.weights.get(endpoint).copied())
            })
            .unwrap_or(1);
        // A cost above capacity could never be served.
        cost.max(1).min(config.max_tokens.max(1))
    }

    /// Completes when the calling operation may proceed.
    ///
    /// Tokens are deducted immediately when available and the queue is
    /// empty; otherwise the caller is enqueued FIFO behind earlier waiters.
    pub async fn acquire(&self, endpoint: Option<&str>, weight: Option<u32>) -> VenueResult<()> {
        let cost = self.resolve_weight(endpoint, weight);
        let rx = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return Err(destroyed_error());
            }
            state.bucket.refill(&self.inner.config, Instant::now());
            if state.queue.is_empty() && state.bucket.tokens >= cost {
                state.bucket.tokens -= cost;
                return Ok(());
            }

            debug!(endpoint, cost, queued = state.queue.len() + 1, "rate limit queueing");
            if let Some(metrics) = &self.inner.metrics {
                metrics.record_rate_limit_hit();
            }
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(Waiter { weight: cost, tx });
            self.ensure_processor(&mut state);
            rx
        };
        self.inner.notify.notify_one();
        rx.await.unwrap_or_else(|_| Err(destroyed_error()))
    }

    /// Non-blocking acquire; returns whether the tokens were consumed.
    pub fn try_acquire(&self, endpoint: Option<&str>, weight: Option<u32>) -> bool {
        let cost = self.resolve_weight(endpoint, weight);
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return false;
        }
        state.bucket.refill(&self.inner.config, Instant::now());
        if state.queue.is_empty() && state.bucket.tokens >= cost {
            state.bucket.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, after refill accounting.
    pub fn available_tokens(&self) -> u32 {
        let mut state = self.inner.state.lock();
        state.bucket.refill(&self.inner.config, Instant::now());
        state.bucket.tokens
    }

    /// Time until the next refill boundary.
    pub fn time_until_refill(&self) -> Duration {
        let state = self.inner.state.lock();
        self.inner
            .config
            .window
            .saturating_sub(state.bucket.last_refill.elapsed())
    }

    /// Restore the bucket to full capacity and release feasible waiters.
    pub fn reset(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.bucket.tokens = self.inner.config.max_tokens;
            state.bucket.last_refill = Instant::now();
            Self::drain_feasible(&mut state);
        }
        self.inner.notify.notify_one();
    }

    /// Cancel the queue processor and reject every queued waiter.
    ///
    /// Subsequent acquires fail immediately with the same terminal error.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        if let Some(handle) = state.processor.take() {
            handle.abort();
        }
        while let Some(waiter) = state.queue.pop_front() {
            let _ = waiter.tx.send(Err(destroyed_error()));
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Release queued waiters, in order, while the head fits.
    fn drain_feasible(state: &mut State) {
        while state
            .queue
            .front()
            .is_some_and(|head| state.bucket.tokens >= head.weight)
        {
            if let Some(waiter) = state.queue.pop_front() {
                state.bucket.tokens -= waiter.weight;
                let _ = waiter.tx.send(Ok(()));
            }
        }
    }

    fn ensure_processor(&self, state: &mut State) {
        if state.processor.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        state.processor = Some(tokio::spawn(async move {
            loop {
                let sleep_for = {
                    let mut state = inner.state.lock();
                    if state.destroyed {
                        break;
                    }
                    state.bucket.refill(&inner.config, Instant::now());
                    RateLimiter::drain_feasible(&mut state);
                    if state.queue.is_empty() {
                        state.processor = None;
                        break;
                    }
                    inner
                        .config
                        .window
                        .saturating_sub(state.bucket.last_refill.elapsed())
                        .min(QUEUE_POLL_INTERVAL)
                };
                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    _ = inner.notify.notified() => {}
                }
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_tokens: u32, window_ms: u64) -> RateLimitConfig {
        RateLimitConfig::new(max_tokens, Duration::from_millis(window_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_capacity_is_immediate() {
        let limiter = RateLimiter::new(config(3, 1_000));
        limiter.acquire(None, None).await.unwrap();
        limiter.acquire(None, None).await.unwrap();
        limiter.acquire(None, None).await.unwrap();
        assert_eq!(limiter.available_tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_weights_are_applied() {
        let limiter = RateLimiter::new(config(10, 1_000).with_weight("orders", 5));
        limiter.acquire(Some("orders"), None).await.unwrap();
        assert_eq!(limiter.available_tokens(), 5);
        // Explicit weight overrides the endpoint table.
        limiter.acquire(Some("orders"), Some(2)).await.unwrap();
        assert_eq!(limiter.available_tokens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_acquire_completes_after_refill() {
        let limiter = RateLimiter::new(config(2, 1_000));
        limiter.acquire(None, None).await.unwrap();
        limiter.acquire(None, None).await.unwrap();

        let queued = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.acquire(None, None).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!queued.is_finished());

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        queued.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_fairness() {
        let limiter = RateLimiter::new(config(1, 1_000));
        limiter.acquire(None, None).await.unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let limiter = limiter.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                limiter.acquire(None, None).await.unwrap();
                order.lock().push(i);
            }));
            // Let each task enqueue before spawning the next.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        tokio::time::sleep(Duration::from_secs(4)).await;
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_head_of_line_blocks_lighter_waiters() {
        let limiter = RateLimiter::new(
            config(4, 1_000).with_refill_rate(1),
        );
        limiter.acquire(None, Some(4)).await.unwrap();

        let heavy = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.acquire(None, Some(3)).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        let light = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.acquire(None, Some(1)).await }
        });

        // After one window a single token refills: enough for the light
        // waiter, but the heavy head must go first.
        tokio::time::sleep(Duration::from_millis(1_050)).await;
        assert!(!heavy.is_finished());
        assert!(!light.is_finished());

        tokio::time::sleep(Duration::from_secs(3)).await;
        heavy.await.unwrap().unwrap();
        light.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire() {
        let limiter = RateLimiter::new(config(1, 1_000));
        assert!(limiter.try_acquire(None, None));
        assert!(!limiter.try_acquire(None, None));
        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert!(limiter.try_acquire(None, None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_conservation() {
        // Over ~3 windows, at most max_tokens + 3 * refill_rate may pass.
        let limiter = RateLimiter::new(config(2, 100).with_refill_rate(2));
        let mut granted = 0u32;
        let deadline = Instant::now() + Duration::from_millis(350);
        while Instant::now() < deadline {
            if limiter.try_acquire(None, None) {
                granted += 1;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(granted <= 2 + 3 * 2, "granted {granted}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_rejects_waiters_and_future_acquires() {
        let limiter = RateLimiter::new(config(1, 10_000));
        limiter.acquire(None, None).await.unwrap();

        let queued = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.acquire(None, None).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        limiter.destroy();
        let result = queued.await.unwrap();
        assert!(result.is_err());
        assert!(limiter.acquire(None, None).await.is_err());
        assert!(!limiter.try_acquire(None, None));
        assert!(limiter.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_capacity() {
        let limiter = RateLimiter::new(config(2, 60_000));
        limiter.acquire(None, Some(2)).await.unwrap();
        assert_eq!(limiter.available_tokens(), 0);
        limiter.reset();
        assert_eq!(limiter.available_tokens(), 2);
    }

    #[test]
    fn test_time_until_refill_is_bounded_by_window() {
        tokio_test::block_on(async {
            let limiter = RateLimiter::new(config(1, 500));
            assert!(limiter.time_until_refill() <= Duration::from_millis(500));
        });
    }
}
