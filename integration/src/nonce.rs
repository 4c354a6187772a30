//! Stateful authentication support: monotonic nonces and session tokens.

use async_trait::async_trait;
use derive_more::Constructor;
use kestrel_markets::VenueResult;
use smol_str::SmolStr;
use std::sync::Arc;
use std::time::Duration;

/// Serialized monotonic nonce allocator.
///
/// `next()` returns the current value and increments atomically, so two
/// concurrent signers never receive the same nonce and the issued values
/// form a contiguous range.
#[derive(Debug)]
pub struct NonceManager {
    initial: u64,
    state: parking_lot::Mutex<u64>,
}

impl NonceManager {
    pub fn new(initial: u64) -> Self {
        Self {
            initial,
            state: parking_lot::Mutex::new(initial),
        }
    }

    /// Seed from the wall clock, the convention for timestamp-nonce venues.
    pub fn from_clock() -> Self {
        Self::new(chrono::Utc::now().timestamp_millis() as u64)
    }

    /// Allocate the next nonce.
    pub fn next(&self) -> u64 {
        let mut state = self.state.lock();
        let nonce = *state;
        *state += 1;
        nonce
    }

    pub fn current(&self) -> u64 {
        *self.state.lock()
    }

    /// Synchronize with an externally-authoritative value.
    pub fn set(&self, value: u64) {
        *self.state.lock() = value;
    }

    /// Give back the most recently allocated nonce, when the signed
    /// message is known not to have been submitted. Only reorders from the
    /// tail.
    pub fn rollback(&self) {
        let mut state = self.state.lock();
        *state = state.saturating_sub(1).max(self.initial);
    }

    pub fn reset(&self) {
        *self.state.lock() = self.initial;
    }

    /// Adopt the server's last-used value: the next allocation will exceed
    /// both it and anything handed out locally.
    pub fn sync_from_server(&self, last_used: u64) {
        let mut state = self.state.lock();
        *state = (*state).max(last_used + 1);
    }
}

/// A bearer/WebSocket auth token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Constructor)]
pub struct SessionAuth {
    pub token: SmolStr,
    /// Milliseconds since the Unix epoch.
    pub expires_at_ms: i64,
}

/// Produces a fresh [`SessionAuth`], typically by signing a login payload.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> VenueResult<SessionAuth>;
}

/// Refresh-ahead cache for session tokens.
///
/// `current()` returns the cached token while it has more than
/// `refresh_buffer` of validity left, and refreshes it otherwise.
/// Refreshes are serialized; concurrent callers wait for one refresh.
pub struct SessionTokenCache {
    refresher: Arc<dyn TokenRefresher>,
    refresh_buffer: Duration,
    state: tokio::sync::Mutex<Option<SessionAuth>>,
}

impl std::fmt::Debug for SessionTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenCache")
            .field("refresh_buffer", &self.refresh_buffer)
            .finish()
    }
}

impl SessionTokenCache {
    pub fn new(refresher: Arc<dyn TokenRefresher>, refresh_buffer: Duration) -> Self {
        Self {
            refresher,
            refresh_buffer,
            state: tokio::sync::Mutex::new(None),
        }
    }

    /// The current token, refreshed when inside the expiry buffer.
    pub async fn current(&self) -> VenueResult<SmolStr> {
        let mut state = self.state.lock().await;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let buffer_ms = self.refresh_buffer.as_millis() as i64;

        if let Some(auth) = state.as_ref() {
            if now_ms < auth.expires_at_ms - buffer_ms {
                return Ok(auth.token.clone());
            }
        }

        let fresh = self.refresher.refresh().await?;
        let token = fresh.token.clone();
        *state = Some(fresh);
        Ok(token)
    }

    /// Invalidate the cached token; the next `current()` refreshes.
    pub async fn reset(&self) {
        *self.state.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_next_is_contiguous() {
        let nonces = NonceManager::new(100);
        assert_eq!(nonces.next(), 100);
        assert_eq!(nonces.next(), 101);
        assert_eq!(nonces.current(), 102);
    }

    #[tokio::test]
    async fn test_concurrent_next_has_no_duplicates() {
        let nonces = Arc::new(NonceManager::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let nonces = Arc::clone(&nonces);
            handles.push(tokio::spawn(async move {
                (0..250).map(|_| nonces.next()).collect::<Vec<_>>()
            }));
        }
        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        let expected: Vec<u64> = (0..2_000).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_rollback_from_tail() {
        let nonces = NonceManager::new(10);
        let issued = nonces.next();
        assert_eq!(issued, 10);
        nonces.rollback();
        assert_eq!(nonces.next(), 10);
        // Rollback never goes below the initial value.
        nonces.rollback();
        nonces.rollback();
        assert_eq!(nonces.current(), 10);
    }

    #[test]
    fn test_sync_from_server_only_advances() {
        let nonces = NonceManager::new(0);
        nonces.sync_from_server(50);
        assert_eq!(nonces.current(), 51);
        nonces.sync_from_server(10);
        assert_eq!(nonces.current(), 51);
    }

    #[test]
    fn test_set_and_reset() {
        let nonces = NonceManager::new(5);
        nonces.set(99);
        assert_eq!(nonces.current(), 99);
        nonces.reset();
        assert_eq!(nonces.current(), 5);
    }

    struct CountingRefresher {
        calls: AtomicU64,
        ttl_ms: i64,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self) -> VenueResult<SessionAuth> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SessionAuth::new(
                SmolStr::new(format!("token-{call}")),
                chrono::Utc::now().timestamp_millis() + self.ttl_ms,
            ))
        }
    }

    #[tokio::test]
    async fn test_token_cached_while_fresh() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicU64::new(0),
            ttl_ms: 60_000,
        });
        let cache = SessionTokenCache::new(refresher.clone(), Duration::from_secs(5));
        assert_eq!(cache.current().await.unwrap(), "token-0");
        assert_eq!(cache.current().await.unwrap(), "token-0");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_refreshes_inside_buffer() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicU64::new(0),
            // Expires within the refresh buffer immediately.
            ttl_ms: 1_000,
        });
        let cache = SessionTokenCache::new(refresher.clone(), Duration::from_secs(5));
        assert_eq!(cache.current().await.unwrap(), "token-0");
        assert_eq!(cache.current().await.unwrap(), "token-1");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reset_invalidates() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicU64::new(0),
            ttl_ms: 60_000,
        });
        let cache = SessionTokenCache::new(refresher.clone(), Duration::from_secs(5));
        let _ = cache.current().await.unwrap();
        cache.reset().await;
        assert_eq!(cache.current().await.unwrap(), "token-1");
    }
}
