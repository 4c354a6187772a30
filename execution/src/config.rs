//! Driver configuration.
//!
//! An enumerated record rather than an open option bag: unknown fields are
//! rejected at deserialization. Secret-bearing fields use the redacting
//! [`Secret`] wrapper and never serialize their contents.

use kestrel_integration::breaker::BreakerConfig;
use kestrel_integration::limit::RateLimitConfig;
use kestrel_integration::signer::Secret;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct VenueConfig {
    pub api_key: Option<String>,
    pub api_secret: Option<Secret>,
    /// Raw signing key for venues authenticated by a wallet key
    /// (hex with or without `0x`, or base64).
    pub api_private_key: Option<Secret>,
    /// Wallet address or keypair, venue-dependent.
    pub wallet: Option<String>,
    /// BIP-39 mnemonic for Cosmos-style venues.
    pub mnemonic: Option<Secret>,
    pub testnet: bool,
    pub timeout: Option<u64>,
    pub debug: bool,
    pub rate_limit: Option<RateLimitSettings>,
    pub circuit_breaker: Option<BreakerSettings>,
    pub builder_code: Option<String>,
    pub builder_code_enabled: bool,
    pub subaccount_number: Option<u32>,
}

impl VenueConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    /// Resolve the rate-limit configuration, falling back to the driver's
    /// venue defaults.
    pub fn rate_limit_config(&self, defaults: RateLimitConfig) -> RateLimitConfig {
        match &self.rate_limit {
            None => defaults,
            Some(settings) => {
                let mut config = RateLimitConfig::new(
                    settings.max_requests,
                    Duration::from_millis(settings.window_ms),
                );
                if settings.weights.is_empty() {
                    config.weights = defaults.weights;
                } else {
                    for (endpoint, cost) in &settings.weights {
                        config = config.with_weight(endpoint.as_str(), *cost);
                    }
                }
                config
            }
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        match &self.circuit_breaker {
            None => BreakerConfig::default(),
            Some(settings) => BreakerConfig {
                failure_threshold: settings.failure_threshold,
                success_threshold: settings.success_threshold,
                reset_timeout: Duration::from_millis(settings.reset_timeout_ms),
                enabled: settings.enabled,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_ms: u64,
    #[serde(default)]
    pub weights: BTreeMap<String, u32>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_rejected() {
        let raw = r#"{"apiKey": "k", "turboMode": true}"#;
        assert!(serde_json::from_str::<VenueConfig>(raw).is_err());
    }

    #[test]
    fn test_defaults() {
        let config: VenueConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(30_000));
        assert!(!config.testnet);
        assert!(config.rate_limit.is_none());
    }

    #[test]
    fn test_secrets_never_serialize() {
        let config: VenueConfig = serde_json::from_str(
            r#"{"apiKey": "key", "apiSecret": "super-secret", "mnemonic": "word word"}"#,
        )
        .unwrap();
        let rendered = serde_json::to_string(&config).unwrap();
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("word word"));
        assert!(rendered.contains("key"));
    }

    #[test]
    fn test_rate_limit_override() {
        let config: VenueConfig = serde_json::from_str(
            r#"{"rateLimit": {"maxRequests": 10, "windowMs": 500, "weights": {"order": 5}}}"#,
        )
        .unwrap();
        let resolved = config.rate_limit_config(RateLimitConfig::new(
            2_400,
            Duration::from_secs(60),
        ));
        assert_eq!(resolved.max_tokens, 10);
        assert_eq!(resolved.window, Duration::from_millis(500));
        assert_eq!(resolved.weights.get("order"), Some(&5));
    }

    #[test]
    fn test_breaker_settings() {
        let config: VenueConfig = serde_json::from_str(
            r#"{"circuitBreaker": {"failureThreshold": 3, "successThreshold": 1, "resetTimeoutMs": 5000}}"#,
        )
        .unwrap();
        let breaker = config.breaker_config();
        assert_eq!(breaker.failure_threshold, 3);
        assert!(breaker.enabled);
        assert_eq!(breaker.reset_timeout, Duration::from_secs(5));
    }
}
