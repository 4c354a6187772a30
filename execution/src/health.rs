//! Health checks and venue status.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    pub reachable: bool,
    pub latency_ms: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub latency_ms: f64,
    pub api: ApiHealth,
    /// Whether the streaming socket currently holds subscriptions.
    pub websocket: Option<bool>,
    /// Whether credentials are configured.
    pub auth: Option<bool>,
    /// Tokens currently available in the rate limiter.
    pub rate_limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthCheckConfig {
    /// API latency above this marks the venue degraded.
    pub degraded_threshold: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            degraded_threshold: Duration::from_secs(1),
        }
    }
}

/// Result of the `fetch_status` probe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum VenueStatus {
    Ok,
    Error { message: String },
}

impl HealthReport {
    /// Classify a probe outcome.
    pub fn from_probe(
        api: ApiHealth,
        config: &HealthCheckConfig,
        websocket: Option<bool>,
        auth: Option<bool>,
        rate_limit: Option<u32>,
    ) -> Self {
        let status = if !api.reachable {
            HealthStatus::Unhealthy
        } else if api.latency_ms > config.degraded_threshold.as_secs_f64() * 1_000.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        Self {
            status,
            latency_ms: api.latency_ms,
            api,
            websocket,
            auth,
            rate_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_classification() {
        let config = HealthCheckConfig::default();
        let healthy = HealthReport::from_probe(
            ApiHealth { reachable: true, latency_ms: 50.0, error: None },
            &config,
            None,
            Some(true),
            Some(100),
        );
        assert_eq!(healthy.status, HealthStatus::Healthy);

        let degraded = HealthReport::from_probe(
            ApiHealth { reachable: true, latency_ms: 2_500.0, error: None },
            &config,
            None,
            None,
            None,
        );
        assert_eq!(degraded.status, HealthStatus::Degraded);

        let unhealthy = HealthReport::from_probe(
            ApiHealth {
                reachable: false,
                latency_ms: 0.0,
                error: Some("connection refused".to_string()),
            },
            &config,
            None,
            None,
            None,
        );
        assert_eq!(unhealthy.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_venue_status_serde() {
        assert_eq!(
            serde_json::to_value(VenueStatus::Ok).unwrap(),
            serde_json::json!({"status": "ok"})
        );
        assert_eq!(
            serde_json::to_value(VenueStatus::Error { message: "down".to_string() }).unwrap(),
            serde_json::json!({"status": "error", "message": "down"})
        );
    }
}
