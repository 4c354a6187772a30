//! Three-state circuit breaker.
//!
//! `Closed -> Open -> HalfOpen -> Closed`. While Open, requests are
//! rejected immediately; after `reset_timeout` the next request becomes a
//! probe in HalfOpen. The Open deadline is stored state evaluated lazily
//! on the next check, so the breaker owns no background task and
//! `destroy()` is purely state-dropping.

use crate::metric::{
    VenueMetrics, BREAKER_GAUGE_CLOSED, BREAKER_GAUGE_HALF_OPEN, BREAKER_GAUGE_OPEN,
};
use kestrel_markets::{ErrorKind, VenueError, VenueResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "halfOpen",
        }
    }

    pub fn gauge(&self) -> u8 {
        match self {
            BreakerState::Closed => BREAKER_GAUGE_CLOSED,
            BreakerState::HalfOpen => BREAKER_GAUGE_HALF_OPEN,
            BreakerState::Open => BREAKER_GAUGE_OPEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakerConfig {
    /// Consecutive failures in Closed that trip the breaker.
    pub failure_threshold: u32,
    /// Consecutive probe successes in HalfOpen that close it again.
    pub success_threshold: u32,
    /// How long Open lasts before the next request probes.
    pub reset_timeout: Duration,
    pub enabled: bool,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            enabled: true,
        }
    }
}

/// Live breaker counters exposed through driver metrics accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerMetrics {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
}

#[derive(Debug)]
struct StateData {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    open_until: Option<Instant>,
    destroyed: bool,
}

/// Circuit breaker guarding one venue's HTTP surface.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: BreakerConfig,
    state: Mutex<StateData>,
    metrics: Option<Arc<VenueMetrics>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_metrics(config, None)
    }

    pub fn with_metrics(config: BreakerConfig, metrics: Option<Arc<VenueMetrics>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(StateData {
                    state: BreakerState::Closed,
                    consecutive_failures: 0,
                    half_open_successes: 0,
                    open_until: None,
                    destroyed: false,
                }),
                metrics,
            }),
        }
    }

    fn transition(&self, data: &mut StateData, to: BreakerState) {
        let from = data.state;
        if from == to {
            return;
        }
        match to {
            BreakerState::Open => {
                data.open_until = Some(Instant::now() + self.inner.config.reset_timeout);
                warn!(from = from.as_str(), "circuit breaker opened");
            }
            BreakerState::HalfOpen => {
                data.half_open_successes = 0;
                data.open_until = None;
                debug!("circuit breaker half-open, probing");
            }
            BreakerState::Closed => {
                data.consecutive_failures = 0;
                data.half_open_successes = 0;
                data.open_until = None;
                debug!("circuit breaker closed");
            }
        }
        data.state = to;
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_breaker_transition(from.as_str(), to.as_str(), to.gauge());
        }
    }

    /// Gate a request. Fails fast with an `ExchangeUnavailable`-kinded
    /// error while Open; transitions to HalfOpen once the reset deadline
    /// has passed.
    pub fn check(&self) -> VenueResult<()> {
        if !self.inner.config.enabled {
            return Ok(());
        }
        let mut data = self.inner.state.lock();
        if data.destroyed {
            return Ok(());
        }
        match data.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let expired = data
                    .open_until
                    .map(|until| Instant::now() >= until)
                    .unwrap_or(true);
                if expired {
                    self.transition(&mut data, BreakerState::HalfOpen);
                    Ok(())
                } else {
                    Err(VenueError::new(
                        ErrorKind::ExchangeUnavailable,
                        "circuit breaker open",
                    ))
                }
            }
        }
    }

    pub fn record_success(&self) {
        if !self.inner.config.enabled {
            return;
        }
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_breaker_success();
        }
        let mut data = self.inner.state.lock();
        if data.destroyed {
            return;
        }
        match data.state {
            BreakerState::Closed => data.consecutive_failures = 0,
            BreakerState::HalfOpen => {
                data.half_open_successes += 1;
                if data.half_open_successes >= self.inner.config.success_threshold {
                    self.transition(&mut data, BreakerState::Closed);
                }
            }
            // A late result from before the trip; nothing to account.
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        if !self.inner.config.enabled {
            return;
        }
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_breaker_failure();
        }
        let mut data = self.inner.state.lock();
        if data.destroyed {
            return;
        }
        match data.state {
            BreakerState::Closed => {
                data.consecutive_failures += 1;
                if data.consecutive_failures >= self.inner.config.failure_threshold {
                    self.transition(&mut data, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => self.transition(&mut data, BreakerState::Open),
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.state.lock().state
    }

    pub fn metrics(&self) -> BreakerMetrics {
        let data = self.inner.state.lock();
        BreakerMetrics {
            state: data.state,
            consecutive_failures: data.consecutive_failures,
            half_open_successes: data.half_open_successes,
        }
    }

    /// Drop the pending reset deadline and stop reacting to results.
    /// Idempotent; used by driver `disconnect`.
    pub fn destroy(&self) {
        let mut data = self.inner.state.lock();
        data.destroyed = true;
        data.open_until = None;
    }

    /// Return to Closed with zeroed counters.
    pub fn reset(&self) {
        let mut data = self.inner.state.lock();
        if data.destroyed {
            return;
        }
        self.transition(&mut data, BreakerState::Closed);
    }
}
