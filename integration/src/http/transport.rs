//! Transport seam beneath the HTTP pipeline.
//!
//! [`HttpTransport`] isolates the retry/breaker/metrics pipeline from the
//! actual wire so tests can script responses without a network.

use async_trait::async_trait;
use bytes::Bytes;
use kestrel_markets::{ErrorKind, VenueError, VenueResult};
use reqwest::Method;
use smol_str::SmolStr;
use std::time::Duration;

/// A fully-prepared outbound request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(SmolStr, String)>,
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

/// The raw response, before any pipeline interpretation.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(SmolStr, String)>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `Retry-After` in delta-seconds form, when present.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// Sends one prepared request and returns the raw response.
///
/// Implementations map transport failures onto the error taxonomy:
/// timeouts become [`ErrorKind::Timeout`], everything else
/// [`ErrorKind::Network`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> VenueResult<TransportResponse>;
}

/// Production transport over a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> VenueResult<TransportResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .timeout(request.timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|error| {
            let kind = if error.is_timeout() {
                ErrorKind::Timeout
            } else {
                ErrorKind::Network
            };
            VenueError::new(kind, format!("transport failure: {error}")).with_cause(error)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(key, value)| {
                (
                    SmolStr::new(key.as_str()),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(|error| {
            VenueError::new(ErrorKind::Network, format!("body read failure: {error}"))
                .with_cause(error)
        })?;

        Ok(TransportResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = TransportResponse {
            status: 429,
            headers: vec![(SmolStr::new("Retry-After"), "7".to_string())],
            body: Bytes::new(),
        };
        assert_eq!(response.header("retry-after"), Some("7"));
        assert_eq!(response.retry_after(), Some(Duration::from_secs(7)));
        assert!(!response.is_success());
    }
}
