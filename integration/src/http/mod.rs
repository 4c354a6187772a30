//! Retriable HTTP request pipeline.
//!
//! Per request: assign a correlation id -> circuit-breaker gate -> up to
//! `max_attempts` transport attempts with capped, jittered exponential
//! backoff between retryable failures -> typed error classification ->
//! metric emission. The pipeline never touches the rate limiter; drivers
//! acquire tokens before handing off.

use crate::breaker::CircuitBreaker;
use crate::metric::VenueMetrics;
use bytes::Bytes;
use kestrel_markets::{ErrorKind, VenueError, VenueId, VenueResult};
use reqwest::Method;
use smol_str::SmolStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

pub mod retry;
pub mod transport;

pub use retry::{is_retryable_status, RetryPolicy, RETRYABLE_STATUS};
pub use transport::{HttpTransport, ReqwestTransport, TransportRequest, TransportResponse};

/// Header carrying the per-request correlation id.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A parsed pipeline response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub body: serde_json::Value,
    pub status: u16,
    /// Correlation id injected into every attempt of this request.
    pub correlation_id: SmolStr,
    /// Number of attempts performed (1 = no retries needed).
    pub attempts: u32,
}

/// The request execution pipeline owned by one driver.
pub struct HttpClient {
    venue: VenueId,
    transport: Arc<dyn HttpTransport>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    timeout: Duration,
    metrics: Arc<VenueMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("venue", &self.venue)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpClient {
    pub fn new(
        venue: VenueId,
        transport: Arc<dyn HttpTransport>,
        breaker: CircuitBreaker,
        retry: RetryPolicy,
        timeout: Option<Duration>,
        metrics: Arc<VenueMetrics>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            venue,
            transport,
            breaker,
            retry,
            timeout: timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            metrics,
            shutdown_tx,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Abort every in-flight request. Subsequent requests fail immediately.
    pub fn abort_all(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    fn aborted_error(&self, correlation_id: &SmolStr) -> VenueError {
        VenueError::new(ErrorKind::Network, "http client closed")
            .with_venue(self.venue)
            .with_correlation_id(correlation_id.clone())
    }

    /// Execute one request through the full pipeline and parse the JSON
    /// response body.
    pub async fn request(
        &self,
        endpoint: &str,
        method: Method,
        url: &str,
        headers: &[(SmolStr, String)],
        body: Option<&serde_json::Value>,
    ) -> VenueResult<HttpResponse> {
        let correlation_id = SmolStr::new(uuid::Uuid::new_v4().to_string());
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return Err(self.aborted_error(&correlation_id));
        }

        self.breaker.check().map_err(|error| {
            error
                .with_venue(self.venue)
                .with_correlation_id(correlation_id.clone())
        })?;

        let body_bytes = match body {
            Some(value) => Some(Bytes::from(serde_json::to_vec(value).map_err(|error| {
                VenueError::new(ErrorKind::Validation, format!("body serialization: {error}"))
                    .with_venue(self.venue)
                    .with_correlation_id(correlation_id.clone())
            })?)),
            None => None,
        };

        let mut last_error: Option<VenueError> = None;
        for attempt in 0..self.retry.max_attempts {
            let request = self.build_request(method.clone(), url, headers, &body_bytes, &correlation_id);
            let started = Instant::now();

            let outcome = tokio::select! {
                outcome = self.transport.send(request) => outcome,
                _ = shutdown_rx.changed() => return Err(self.aborted_error(&correlation_id)),
            };
            let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;

            match outcome {
                Ok(response) if response.is_success() => {
                    self.metrics
                        .record_request(endpoint, response.status, latency_ms, true);
                    self.breaker.record_success();
                    let value = if response.body.is_empty() {
                        serde_json::Value::Null
                    } else {
                        serde_json::from_slice(&response.body).map_err(|error| {
                            VenueError::new(
                                ErrorKind::Unknown,
                                format!("malformed JSON response: {error}"),
                            )
                            .with_venue(self.venue)
                            .with_correlation_id(correlation_id.clone())
                        })?
                    };
                    return Ok(HttpResponse {
                        body: value,
                        status: response.status,
                        correlation_id,
                        attempts: attempt + 1,
                    });
                }
                Ok(response) => {
                    self.metrics
                        .record_request(endpoint, response.status, latency_ms, false);
                    let retryable = is_retryable_status(response.status);
                    if retryable {
                        self.breaker.record_failure();
                    }
                    let error = self
                        .error_from_response(&response)
                        .with_correlation_id(correlation_id.clone());
                    self.metrics.record_error(endpoint, error.standard_code());

                    if retryable && attempt + 1 < self.retry.max_attempts {
                        let delay = self.backoff_delay(attempt, response.retry_after());
                        debug!(
                            endpoint,
                            status = response.status,
                            attempt,
                            ?delay,
                            correlation_id = %correlation_id,
                            "retrying after http error"
                        );
                        last_error = Some(error);
                        if self.sleep_or_abort(&mut shutdown_rx, delay).await {
                            return Err(self.aborted_error(&correlation_id));
                        }
                        continue;
                    }
                    return Err(error);
                }
                Err(transport_error) => {
                    self.metrics.record_request(endpoint, 0, latency_ms, false);
                    self.breaker.record_failure();
                    let error = transport_error
                        .with_venue(self.venue)
                        .with_correlation_id(correlation_id.clone());
                    self.metrics.record_error(endpoint, error.standard_code());

                    if error.is_retryable() && attempt + 1 < self.retry.max_attempts {
                        let delay = self.backoff_delay(attempt, None);
                        warn!(
                            endpoint,
                            attempt,
                            ?delay,
                            correlation_id = %correlation_id,
                            "retrying after transport error"
                        );
                        last_error = Some(error);
                        if self.sleep_or_abort(&mut shutdown_rx, delay).await {
                            return Err(self.aborted_error(&correlation_id));
                        }
                        continue;
                    }
                    return Err(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            VenueError::new(ErrorKind::Unknown, "retries exhausted")
                .with_venue(self.venue)
                .with_correlation_id(correlation_id)
        }))
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        headers: &[(SmolStr, String)],
        body: &Option<Bytes>,
        correlation_id: &SmolStr,
    ) -> TransportRequest {
        let mut all_headers: Vec<(SmolStr, String)> = Vec::with_capacity(headers.len() + 2);
        all_headers.push((SmolStr::new(CORRELATION_HEADER), correlation_id.to_string()));
        if body.is_some()
            && !headers
                .iter()
                .any(|(key, _)| key.eq_ignore_ascii_case("content-type"))
        {
            all_headers.push((SmolStr::new("Content-Type"), "application/json".to_string()));
        }
        all_headers.extend(headers.iter().cloned());

        TransportRequest {
            method,
            url: url.to_string(),
            headers: all_headers,
            body: body.clone(),
            timeout: self.timeout,
        }
    }

    fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.retry.jittered_delay(attempt);
        match retry_after {
            Some(server) => backoff.max(server),
            None => backoff,
        }
    }

    /// Returns true when aborted.
    async fn sleep_or_abort(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
        delay: Duration,
    ) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = shutdown_rx.changed() => true,
        }
    }

    fn error_from_response(&self, response: &TransportResponse) -> VenueError {
        let mut kind = ErrorKind::from_http_status(response.status);
        if let ErrorKind::RateLimit { retry_after_ms } = &mut kind {
            *retry_after_ms = response.retry_after().map(|d| d.as_millis() as u64);
        }
        let mut message = String::from_utf8_lossy(&response.body).into_owned();
        if message.is_empty() {
            message = format!("http status {}", response.status);
        } else if message.len() > 512 {
            message.truncate(512);
        }
        VenueError::new(kind, message)
            .with_venue(self.venue)
            .with_venue_code(response.status.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerConfig, BreakerState};
    use parking_lot::Mutex;

    /// Transport that pops scripted outcomes in order, recording each
    /// request it sees.
    #[derive(Default)]
    pub struct ScriptedTransport {
        script: Mutex<Vec<VenueResult<TransportResponse>>>,
        pub seen: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<VenueResult<TransportResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(outcomes),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: TransportRequest) -> VenueResult<TransportResponse> {
            self.seen.lock().push(request);
            let mut script = self.script.lock();
            if script.is_empty() {
                return Err(VenueError::new(ErrorKind::Network, "script exhausted"));
            }
            script.remove(0)
        }
    }

    fn ok_json(body: &str) -> VenueResult<TransportResponse> {
        Ok(TransportResponse {
            status: 200,
            headers: vec![],
            body: Bytes::from(body.to_string()),
        })
    }

    fn status(code: u16) -> VenueResult<TransportResponse> {
        Ok(TransportResponse {
            status: code,
            headers: vec![],
            body: Bytes::new(),
        })
    }

    fn client(transport: Arc<ScriptedTransport>) -> HttpClient {
        let metrics = Arc::new(VenueMetrics::new(VenueId::Mock));
        HttpClient::new(
            VenueId::Mock,
            transport,
            CircuitBreaker::with_metrics(BreakerConfig::default(), Some(Arc::clone(&metrics))),
            RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(10),
                multiplier: 2.0,
                max_delay: Duration::from_secs(1),
                jitter: false,
            },
            None,
            metrics,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_parses_json() {
        let transport = ScriptedTransport::new(vec![ok_json(r#"{"price": 42.0}"#)]);
        let client = client(Arc::clone(&transport));
        let response = client
            .request("ticker", Method::GET, "https://api.mock/ticker", &[], None)
            .await
            .unwrap();
        assert_eq!(response.body["price"], 42.0);
        assert_eq!(response.attempts, 1);
        assert_eq!(response.status, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_on_5xx_then_succeeds() {
        let transport =
            ScriptedTransport::new(vec![status(503), status(503), ok_json(r#"{"ok":true}"#)]);
        let client = client(Arc::clone(&transport));
        let response = client
            .request("ticker", Method::GET, "https://api.mock/ticker", &[], None)
            .await
            .unwrap();
        assert_eq!(response.attempts, 3);
        assert_eq!(transport.seen.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_correlation_id_stable_across_attempts_and_on_error() {
        let transport = ScriptedTransport::new(vec![status(500), status(500), status(500)]);
        let client = client(Arc::clone(&transport));
        let error = client
            .request("ticker", Method::GET, "https://api.mock/ticker", &[], None)
            .await
            .unwrap_err();

        let seen = transport.seen.lock();
        assert_eq!(seen.len(), 3);
        let correlation: Vec<&str> = seen
            .iter()
            .map(|request| {
                request
                    .headers
                    .iter()
                    .find(|(key, _)| key == CORRELATION_HEADER)
                    .map(|(_, value)| value.as_str())
                    .unwrap()
            })
            .collect();
        assert_eq!(correlation[0], correlation[1]);
        assert_eq!(correlation[1], correlation[2]);
        assert_eq!(error.correlation_id.as_deref(), Some(correlation[0]));
        assert!(error.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_fails_fast() {
        let transport = ScriptedTransport::new(vec![status(400)]);
        let client = client(Arc::clone(&transport));
        let error = client
            .request("order", Method::POST, "https://api.mock/order", &[], None)
            .await
            .unwrap_err();
        assert_eq!(transport.seen.lock().len(), 1);
        assert!(!error.is_retryable());
        assert_eq!(error.venue, Some(VenueId::Mock));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_status_consumes_no_retries() {
        let transport = ScriptedTransport::new(vec![status(401)]);
        let client = client(Arc::clone(&transport));
        let error = client
            .request("balance", Method::GET, "https://api.mock/balance", &[], None)
            .await
            .unwrap_err();
        assert_eq!(transport.seen.lock().len(), 1);
        assert!(error.is_auth());
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_after_consecutive_failures() {
        let transport = ScriptedTransport::new(
            (0..10).map(|_| status(500)).collect(),
        );
        let metrics = Arc::new(VenueMetrics::new(VenueId::Mock));
        let client = HttpClient::new(
            VenueId::Mock,
            Arc::clone(&transport) as Arc<dyn HttpTransport>,
            CircuitBreaker::with_metrics(
                BreakerConfig {
                    failure_threshold: 5,
                    ..BreakerConfig::default()
                },
                Some(Arc::clone(&metrics)),
            ),
            RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                multiplier: 2.0,
                max_delay: Duration::from_millis(10),
                jitter: false,
            },
            None,
            metrics,
        );

        // Two requests of three attempts each: six breaker failures.
        let _ = client
            .request("ticker", Method::GET, "https://api.mock/t", &[], None)
            .await;
        let _ = client
            .request("ticker", Method::GET, "https://api.mock/t", &[], None)
            .await;
        assert_eq!(client.breaker().state(), BreakerState::Open);

        // Next call is rejected without touching the transport.
        let seen_before = transport.seen.lock().len();
        let error = client
            .request("ticker", Method::GET, "https://api.mock/t", &[], None)
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ExchangeUnavailable);
        assert!(error.correlation_id.is_some());
        assert_eq!(transport.seen.lock().len(), seen_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_header_extends_backoff() {
        let transport = ScriptedTransport::new(vec![
            Ok(TransportResponse {
                status: 429,
                headers: vec![(SmolStr::new("Retry-After"), "1".to_string())],
                body: Bytes::new(),
            }),
            ok_json("{}"),
        ]);
        let client = client(Arc::clone(&transport));
        let started = Instant::now();
        let response = client
            .request("ticker", Method::GET, "https://api.mock/t", &[], None)
            .await
            .unwrap();
        assert_eq!(response.attempts, 2);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_all_cancels_pending() {
        struct Hanging;
        #[async_trait::async_trait]
        impl HttpTransport for Hanging {
            async fn send(&self, _: TransportRequest) -> VenueResult<TransportResponse> {
                futures::future::pending().await
            }
        }

        let metrics = Arc::new(VenueMetrics::new(VenueId::Mock));
        let client = Arc::new(HttpClient::new(
            VenueId::Mock,
            Arc::new(Hanging),
            CircuitBreaker::new(BreakerConfig::default()),
            RetryPolicy::default(),
            None,
            metrics,
        ));

        let pending = tokio::spawn({
            let client = Arc::clone(&client);
            async move {
                client
                    .request("ticker", Method::GET, "https://api.mock/t", &[], None)
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        client.abort_all();
        let result = pending.await.unwrap();
        assert!(result.is_err());
        assert!(client.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_capture_attempt_counts() {
        let transport = ScriptedTransport::new(vec![status(503), ok_json("{}")]);
        let metrics = Arc::new(VenueMetrics::new(VenueId::Mock));
        let client = HttpClient::new(
            VenueId::Mock,
            transport,
            CircuitBreaker::new(BreakerConfig::default()),
            RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                multiplier: 2.0,
                max_delay: Duration::from_millis(10),
                jitter: false,
            },
            None,
            Arc::clone(&metrics),
        );

        client
            .request("ticker", Method::GET, "https://api.mock/t", &[], None)
            .await
            .unwrap();
        let snapshot = metrics.snapshot();
        let stats = &snapshot.requests[0];
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(snapshot.errors.len(), 1);
    }
}
