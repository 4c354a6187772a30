//! WebSocket runtime.
//!
//! One multiplexed connection per venue. The runtime owns the socket
//! lifecycle (connect, heartbeat, reconnect-with-resubscribe, disconnect)
//! and a reference-counted subscription registry. Consumers receive
//! already-routed events through bounded per-consumer [`EventStream`]s;
//! within one channel, delivery preserves server order.
//!
//! A transient transport failure triggers reconnection and resubscription
//! without consumer involvement; streams only end with
//! `WebSocketDisconnected` once the reconnect budget is exhausted, or
//! cleanly on [`WsRuntime::disconnect`].

use crate::collection::{FnvIndexMap, FnvIndexSet};
use crate::metric::VenueMetrics;
use kestrel_markets::{ErrorKind, VenueError, VenueResult};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub mod stream;
pub mod transport;

pub(crate) use stream::{Command, Inbox};
pub use stream::{ChannelId, EventStream};
pub use transport::{TungsteniteTransport, WsFrame, WsSession, WsTransport};

/// Builds a fresh auth payload for an authenticated channel.
///
/// Called at every (re)subscription so stale tokens are never reused.
pub trait ChannelAuth: Send + Sync {
    fn auth_payload(&self) -> VenueResult<serde_json::Value>;
}

/// Everything the runtime needs to manage one channel.
#[derive(Clone)]
pub struct ChannelSpec {
    pub id: ChannelId,
    pub subscribe: serde_json::Value,
    pub unsubscribe: Option<serde_json::Value>,
    pub auth: Option<Arc<dyn ChannelAuth>>,
}

impl std::fmt::Debug for ChannelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSpec")
            .field("id", &self.id)
            .field("authenticated", &self.auth.is_some())
            .finish()
    }
}

impl ChannelSpec {
    pub fn new(id: impl Into<ChannelId>, subscribe: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            subscribe,
            unsubscribe: None,
            auth: None,
        }
    }

    pub fn with_unsubscribe(mut self, unsubscribe: serde_json::Value) -> Self {
        self.unsubscribe = Some(unsubscribe);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn ChannelAuth>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// The message actually sent at (re)subscription time.
    fn subscribe_message(&self) -> VenueResult<serde_json::Value> {
        match &self.auth {
            Some(auth) => auth.auth_payload(),
            None => Ok(self.subscribe.clone()),
        }
    }
}

/// Exponential reconnect backoff with jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(125),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter_fraction: 0.1,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter = if self.jitter_fraction > 0.0 {
            rand::rng().random_range(1.0 - self.jitter_fraction..=1.0 + self.jitter_fraction)
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * jitter)
    }
}

/// Constructs the venue's keep-alive frame.
pub type PingFactory = fn() -> WsFrame;

fn protocol_ping() -> WsFrame {
    WsFrame::Ping(Vec::new())
}

/// Runtime configuration for one venue connection.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    pub heartbeat_interval: Duration,
    pub pong_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Per-consumer buffer; oldest events are dropped on overflow.
    pub consumer_buffer: usize,
    pub ping: PingFactory,
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            consumer_buffer: 64,
            ping: protocol_ping,
        }
    }

    pub fn with_heartbeat(mut self, interval: Duration, pong_timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.pong_timeout = pong_timeout;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_consumer_buffer(mut self, capacity: usize) -> Self {
        self.consumer_buffer = capacity;
        self
    }

    pub fn with_ping(mut self, ping: PingFactory) -> Self {
        self.ping = ping;
        self
    }
}

/// Maps an inbound payload to the channel it belongs to.
pub type MessageRouter = Arc<dyn Fn(&serde_json::Value) -> Option<ChannelId> + Send + Sync>;

struct Consumer {
    id: u64,
    inbox: Arc<Inbox>,
}

struct Entry {
    spec: ChannelSpec,
    consumers: Vec<Consumer>,
}

#[derive(Default)]
struct Registry {
    entries: FnvIndexMap<ChannelId, Entry>,
    next_consumer_id: u64,
}

struct Shared {
    config: WsConfig,
    transport: Arc<dyn WsTransport>,
    router: MessageRouter,
    registry: Mutex<Registry>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    metrics: Arc<VenueMetrics>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown: AtomicBool,
    ever_connected: AtomicBool,
}

/// The per-venue WebSocket runtime.
#[derive(Clone)]
pub struct WsRuntime {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WsRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsRuntime")
            .field("url", &self.shared.config.url)
            .field("channels", &self.shared.registry.lock().entries.len())
            .field("shutdown", &self.shared.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl WsRuntime {
    pub fn new(
        config: WsConfig,
        transport: Arc<dyn WsTransport>,
        router: MessageRouter,
        metrics: Arc<VenueMetrics>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                router,
                registry: Mutex::new(Registry::default()),
                cmd_tx,
                cmd_rx: Mutex::new(Some(cmd_rx)),
                metrics,
                task: Mutex::new(None),
                shutdown: AtomicBool::new(false),
                ever_connected: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe a new consumer to `spec`'s channel.
    ///
    /// Idempotent per channel: the first consumer triggers the venue
    /// subscription, later consumers share it reference-counted.
    pub fn subscribe(&self, spec: ChannelSpec) -> VenueResult<EventStream> {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(VenueError::new(
                ErrorKind::WebSocketDisconnected,
                "websocket runtime disconnected",
            ));
        }
        self.ensure_task();

        let channel = spec.id.clone();
        let inbox = Arc::new(Inbox::new(self.shared.config.consumer_buffer));
        let consumer_id = {
            let mut registry = self.shared.registry.lock();
            let consumer_id = registry.next_consumer_id;
            registry.next_consumer_id += 1;
            let consumer = Consumer {
                id: consumer_id,
                inbox: Arc::clone(&inbox),
            };
            match registry.entries.get_mut(&channel) {
                Some(entry) => entry.consumers.push(consumer),
                None => {
                    registry.entries.insert(
                        channel.clone(),
                        Entry {
                            spec,
                            consumers: vec![consumer],
                        },
                    );
                }
            }
            consumer_id
        };
        let _ = self.shared.cmd_tx.send(Command::Subscribe(channel.clone()));

        Ok(EventStream::new(
            channel,
            consumer_id,
            inbox,
            self.shared.cmd_tx.clone(),
        ))
    }

    /// Stop the heartbeat, cancel reconnection, close the socket, drop all
    /// subscriptions and deliver end-of-stream to every consumer.
    /// Idempotent.
    pub async fn disconnect(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shared.cmd_tx.send(Command::Disconnect);
        let task = self.shared.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        // Covers the case where no connection task ever ran.
        close_all(&self.shared, None);
    }

    /// Consumers currently attached to `channel`.
    pub fn consumer_count(&self, channel: &str) -> usize {
        self.shared
            .registry
            .lock()
            .entries
            .get(channel)
            .map(|entry| entry.consumers.len())
            .unwrap_or(0)
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.shared.registry.lock().entries.contains_key(channel)
    }

    fn ensure_task(&self) {
        let mut task = self.shared.task.lock();
        if task.is_some() {
            return;
        }
        let Some(cmd_rx) = self.shared.cmd_rx.lock().take() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(run_loop(shared, cmd_rx)));
    }
}

/// End every stream and clear the registry. With an error, consumers see
/// it before end-of-stream.
fn close_all(shared: &Shared, error: Option<&VenueError>) {
    let mut registry = shared.registry.lock();
    for (_, entry) in registry.entries.drain(..) {
        for consumer in entry.consumers {
            match error {
                Some(error) => consumer.inbox.fail(error.clone()),
                None => consumer.inbox.close(),
            }
        }
    }
}

/// Remove one consumer; returns the unsubscribe frame to send when the
/// channel has no consumers left.
fn remove_consumer(shared: &Shared, channel: &ChannelId, consumer_id: u64) -> Option<serde_json::Value> {
    let mut registry = shared.registry.lock();
    let entry = registry.entries.get_mut(channel)?;
    entry.consumers.retain(|consumer| consumer.id != consumer_id);
    if !entry.consumers.is_empty() {
        return None;
    }
    let unsubscribe = entry.spec.unsubscribe.clone();
    registry.entries.shift_remove(channel);
    debug!(%channel, "last consumer gone, unsubscribing");
    unsubscribe
}

/// Route one payload to its channel's consumers.
fn route(shared: &Shared, value: serde_json::Value) {
    let Some(channel) = (shared.router)(&value) else {
        debug!("unrouted websocket message");
        return;
    };
    let evicted = {
        let registry = shared.registry.lock();
        let Some(entry) = registry.entries.get(&channel) else {
            return;
        };
        let mut evicted = 0u64;
        for consumer in &entry.consumers {
            if consumer.inbox.push(value.clone()) {
                evicted += 1;
            }
        }
        evicted
    };
    for _ in 0..evicted {
        shared.metrics.record_ws_dropped(&channel);
    }
}

/// Build and send the (fresh-auth) subscription frame for `channel`.
/// On auth failure the channel's consumers are failed and it is removed.
async fn send_subscription(
    shared: &Shared,
    session: &mut Box<dyn WsSession>,
    channel: &ChannelId,
) -> Result<bool, ()> {
    let message = {
        let registry = shared.registry.lock();
        match registry.entries.get(channel) {
            Some(entry) => entry.spec.subscribe_message(),
            None => return Ok(false),
        }
    };
    match message {
        Ok(message) => {
            session
                .send(WsFrame::Text(message.to_string()))
                .await
                .map_err(|_| ())?;
            Ok(true)
        }
        Err(error) => {
            warn!(%channel, %error, "subscription auth payload failed");
            let mut registry = shared.registry.lock();
            if let Some(entry) = registry.entries.shift_remove(channel) {
                for consumer in entry.consumers {
                    consumer.inbox.fail(error.clone());
                }
            }
            Ok(false)
        }
    }
}

enum Flow {
    Continue,
    Reconnect,
}

async fn handle_frame(
    shared: &Shared,
    session: &mut Box<dyn WsSession>,
    frame: WsFrame,
) -> Flow {
    match frame {
        WsFrame::Text(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => route(shared, value),
            // Non-fatal: log and skip.
            Err(error) => warn!(%error, "skipping malformed websocket frame"),
        },
        WsFrame::Binary(data) => match serde_json::from_slice::<serde_json::Value>(&data) {
            Ok(value) => route(shared, value),
            Err(error) => warn!(%error, "skipping malformed binary frame"),
        },
        WsFrame::Ping(payload) => {
            if session.send(WsFrame::Pong(payload)).await.is_err() {
                return Flow::Reconnect;
            }
        }
        WsFrame::Pong(_) => {}
        WsFrame::Close => return Flow::Reconnect,
    }
    Flow::Continue
}

enum WaitOutcome {
    Elapsed,
    Shutdown,
}

/// Backoff sleep that keeps honoring consumer commands while the socket
/// is down.
async fn backoff_wait(
    shared: &Shared,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    deadline: Instant,
) -> WaitOutcome {
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return WaitOutcome::Elapsed,
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Disconnect) | None => {
                    close_all(shared, None);
                    return WaitOutcome::Shutdown;
                }
                Some(Command::ConsumerDropped(channel, consumer_id)) => {
                    // Socket is down; dropping the registry entry is the
                    // remembered unsubscribe intent.
                    let _ = remove_consumer(shared, &channel, consumer_id);
                }
                Some(Command::Subscribe(_)) => {
                    // Registry-driven resubscription covers it.
                }
            }
        }
    }
}

async fn run_loop(shared: Arc<Shared>, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
    let policy = shared.config.reconnect;
    let mut attempt = 0u32;

    'outer: while !shared.shutdown.load(Ordering::SeqCst) {
        let mut session = match shared.transport.connect(&shared.config.url).await {
            Ok(session) => session,
            Err(error) => {
                attempt += 1;
                warn!(%error, attempt, "websocket connect failed");
                if attempt > policy.max_attempts {
                    close_all(
                        &shared,
                        Some(&VenueError::new(
                            ErrorKind::WebSocketDisconnected,
                            "reconnect attempts exhausted",
                        )),
                    );
                    break;
                }
                let deadline = Instant::now() + policy.delay(attempt - 1);
                match backoff_wait(&shared, &mut cmd_rx, deadline).await {
                    WaitOutcome::Elapsed => continue,
                    WaitOutcome::Shutdown => break,
                }
            }
        };
        if shared.ever_connected.swap(true, Ordering::SeqCst) {
            shared.metrics.record_ws_reconnect();
            info!("websocket reconnected");
        } else {
            info!(url = %shared.config.url, "websocket connected");
        }

        // Resubscribe every registered channel, regenerating auth.
        let mut sent: FnvIndexSet<ChannelId> = FnvIndexSet::default();
        let channels: Vec<ChannelId> = shared.registry.lock().entries.keys().cloned().collect();
        let mut broken = false;
        for channel in channels {
            match send_subscription(&shared, &mut session, &channel).await {
                Ok(true) => {
                    sent.insert(channel);
                }
                Ok(false) => {}
                Err(()) => {
                    broken = true;
                    break;
                }
            }
        }
        if broken {
            session.close().await;
            continue;
        }

        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + shared.config.heartbeat_interval,
            shared.config.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;
        let mut received_any = false;
        let far_future = Duration::from_secs(24 * 3600);

        loop {
            let pong_at = pong_deadline.unwrap_or_else(|| Instant::now() + far_future);
            tokio::select! {
                frame = session.next_frame() => match frame {
                    Some(Ok(frame)) => {
                        // Any inbound traffic proves liveness.
                        pong_deadline = None;
                        received_any = true;
                        attempt = 0;
                        match handle_frame(&shared, &mut session, frame).await {
                            Flow::Continue => {}
                            Flow::Reconnect => break,
                        }
                    }
                    Some(Err(error)) => {
                        warn!(%error, "websocket transport error");
                        break;
                    }
                    None => {
                        debug!("websocket closed by peer");
                        break;
                    }
                },
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Subscribe(channel)) => {
                        if !sent.contains(&channel) {
                            match send_subscription(&shared, &mut session, &channel).await {
                                Ok(true) => { sent.insert(channel); }
                                Ok(false) => {}
                                Err(()) => break,
                            }
                        }
                    }
                    Some(Command::ConsumerDropped(channel, consumer_id)) => {
                        if let Some(unsubscribe) = remove_consumer(&shared, &channel, consumer_id) {
                            sent.swap_remove(&channel);
                            if session
                                .send(WsFrame::Text(unsubscribe.to_string()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                    Some(Command::Disconnect) | None => {
                        session.close().await;
                        close_all(&shared, None);
                        break 'outer;
                    }
                },
                _ = heartbeat.tick() => {
                    if session.send((shared.config.ping)()).await.is_err() {
                        break;
                    }
                    if pong_deadline.is_none() {
                        pong_deadline = Some(Instant::now() + shared.config.pong_timeout);
                    }
                },
                _ = tokio::time::sleep_until(pong_at), if pong_deadline.is_some() => {
                    warn!("heartbeat pong timeout, reconnecting");
                    break;
                }
            }
        }

        session.close().await;

        // A connection that died before delivering anything counts against
        // the reconnect budget, otherwise a flapping endpoint would spin.
        if !received_any {
            attempt += 1;
            if attempt > policy.max_attempts {
                close_all(
                    &shared,
                    Some(&VenueError::new(
                        ErrorKind::WebSocketDisconnected,
                        "reconnect attempts exhausted",
                    )),
                );
                break;
            }
            let deadline = Instant::now() + policy.delay(attempt - 1);
            if matches!(
                backoff_wait(&shared, &mut cmd_rx, deadline).await,
                WaitOutcome::Shutdown
            ) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use kestrel_markets::VenueId;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU64;

    /// A scripted session fed by a queue of inbound frames; records
    /// everything sent by the runtime.
    struct MockSession {
        inbound: Arc<Mutex<VecDeque<WsFrame>>>,
        sent: Arc<Mutex<Vec<WsFrame>>>,
        /// Closes the session when the inbound queue drains.
        close_when_drained: bool,
        notify: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl WsSession for MockSession {
        async fn send(&mut self, frame: WsFrame) -> VenueResult<()> {
            self.sent.lock().push(frame);
            Ok(())
        }

        async fn next_frame(&mut self) -> Option<VenueResult<WsFrame>> {
            loop {
                if let Some(frame) = self.inbound.lock().pop_front() {
                    return Some(Ok(frame));
                }
                if self.close_when_drained {
                    return None;
                }
                self.notify.notified().await;
            }
        }

        async fn close(&mut self) {}
    }

    /// Transport producing one `MockSession` per connect call.
    struct MockTransport {
        connects: AtomicU64,
        /// Frames delivered by the n-th connection.
        scripts: Mutex<VecDeque<Vec<WsFrame>>>,
        sent: Arc<Mutex<Vec<WsFrame>>>,
        close_when_drained: bool,
        notify: Arc<tokio::sync::Notify>,
        fail_connects: AtomicU64,
    }

    impl MockTransport {
        fn new(scripts: Vec<Vec<WsFrame>>, close_when_drained: bool) -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicU64::new(0),
                scripts: Mutex::new(scripts.into_iter().collect()),
                sent: Arc::new(Mutex::new(Vec::new())),
                close_when_drained,
                notify: Arc::new(tokio::sync::Notify::new()),
                fail_connects: AtomicU64::new(0),
            })
        }

        fn sent_texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .filter_map(|frame| match frame {
                    WsFrame::Text(text) => Some(text.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl WsTransport for MockTransport {
        async fn connect(&self, _url: &str) -> VenueResult<Box<dyn WsSession>> {
            if self.fail_connects.load(Ordering::SeqCst) > 0 {
                self.fail_connects.fetch_sub(1, Ordering::SeqCst);
                return Err(VenueError::new(ErrorKind::Network, "connect refused"));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            let inbound = self.scripts.lock().pop_front().unwrap_or_default();
            Ok(Box::new(MockSession {
                inbound: Arc::new(Mutex::new(inbound.into_iter().collect())),
                sent: Arc::clone(&self.sent),
                close_when_drained: self.close_when_drained,
                notify: Arc::clone(&self.notify),
            }))
        }
    }

    fn coin_router() -> MessageRouter {
        Arc::new(|value: &serde_json::Value| {
            value
                .get("channel")
                .and_then(|channel| channel.as_str())
                .map(ChannelId::new)
        })
    }

    fn runtime(transport: Arc<MockTransport>) -> WsRuntime {
        let config = WsConfig::new("wss://mock").with_reconnect(ReconnectPolicy {
            initial_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(100),
            jitter_fraction: 0.0,
            max_attempts: 5,
        });
        WsRuntime::new(
            config,
            transport,
            coin_router(),
            Arc::new(VenueMetrics::new(VenueId::Mock)),
        )
    }

    fn event(channel: &str, id: u64) -> WsFrame {
        WsFrame::Text(format!(r#"{{"channel":"{channel}","id":{id}}}"#))
    }

    #[tokio::test]
    async fn test_subscribe_delivers_routed_events_in_order() {
        let transport = MockTransport::new(
            vec![vec![event("book", 1), event("book", 2), event("trades", 9)]],
            false,
        );
        let runtime = runtime(Arc::clone(&transport));
        let mut book = runtime.subscribe(ChannelSpec::new(
            "book",
            serde_json::json!({"op": "subscribe", "channel": "book"}),
        )).unwrap();

        let first = book.next().await.unwrap().unwrap();
        let second = book.next().await.unwrap().unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);

        assert!(transport
            .sent_texts()
            .iter()
            .any(|text| text.contains("subscribe")));
        runtime.disconnect().await;
    }

    #[tokio::test]
    async fn test_resubscribe_after_forced_close() {
        // First connection delivers one event then closes; the runtime must
        // reconnect and resubscribe without consumer involvement.
        let transport = MockTransport::new(
            vec![vec![event("book", 1)], vec![event("book", 2)]],
            true,
        );
        let runtime = runtime(Arc::clone(&transport));
        let mut book = runtime.subscribe(ChannelSpec::new(
            "book",
            serde_json::json!({"op": "subscribe", "channel": "book"}),
        )).unwrap();

        assert_eq!(book.next().await.unwrap().unwrap()["id"], 1);
        assert_eq!(book.next().await.unwrap().unwrap()["id"], 2);

        assert!(transport.connects.load(Ordering::SeqCst) >= 2);
        let subscribes = transport
            .sent_texts()
            .iter()
            .filter(|text| text.contains("subscribe"))
            .count();
        assert!(subscribes >= 2, "expected resubscription, saw {subscribes}");
        runtime.disconnect().await;
    }

    #[tokio::test]
    async fn test_reference_counted_unsubscribe() {
        let transport = MockTransport::new(vec![vec![]], false);
        let runtime = runtime(Arc::clone(&transport));
        let spec = ChannelSpec::new(
            "trades",
            serde_json::json!({"op": "subscribe", "channel": "trades"}),
        )
        .with_unsubscribe(serde_json::json!({"op": "unsubscribe", "channel": "trades"}));

        let first = runtime.subscribe(spec.clone()).unwrap();
        let second = runtime.subscribe(spec).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runtime.consumer_count("trades"), 2);
        // One subscription frame for two consumers.
        assert_eq!(
            transport
                .sent_texts()
                .iter()
                .filter(|text| text.contains("\"op\":\"subscribe\""))
                .count(),
            1
        );

        drop(first);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runtime.consumer_count("trades"), 1);
        assert!(transport.sent_texts().iter().all(|t| !t.contains("unsubscribe")));

        drop(second);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!runtime.is_subscribed("trades"));
        assert!(transport
            .sent_texts()
            .iter()
            .any(|text| text.contains("unsubscribe")));
        runtime.disconnect().await;
    }

    #[tokio::test]
    async fn test_exhausted_reconnects_fail_streams() {
        let transport = MockTransport::new(vec![], false);
        transport.fail_connects.store(100, Ordering::SeqCst);
        let runtime = runtime(Arc::clone(&transport));
        let mut book = runtime.subscribe(ChannelSpec::new(
            "book",
            serde_json::json!({"op": "subscribe"}),
        )).unwrap();

        let error = book.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind, ErrorKind::WebSocketDisconnected);
        assert!(book.next().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_ends_streams_and_is_idempotent() {
        let transport = MockTransport::new(vec![vec![]], false);
        let runtime = runtime(Arc::clone(&transport));
        let mut book = runtime.subscribe(ChannelSpec::new(
            "book",
            serde_json::json!({"op": "subscribe"}),
        )).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        runtime.disconnect().await;
        runtime.disconnect().await;
        assert!(book.next().await.is_none());
        assert!(runtime.subscribe(ChannelSpec::new("x", serde_json::json!({}))).is_err());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let transport = MockTransport::new(
            vec![vec![
                WsFrame::Text("not json at all".to_string()),
                event("book", 5),
            ]],
            false,
        );
        let runtime = runtime(Arc::clone(&transport));
        let mut book = runtime.subscribe(ChannelSpec::new(
            "book",
            serde_json::json!({"op": "subscribe"}),
        )).unwrap();
        assert_eq!(book.next().await.unwrap().unwrap()["id"], 5);
        runtime.disconnect().await;
    }

    #[tokio::test]
    async fn test_fresh_auth_payload_per_connection() {
        struct CountingAuth(AtomicU64);
        impl ChannelAuth for CountingAuth {
            fn auth_payload(&self) -> VenueResult<serde_json::Value> {
                let n = self.0.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({"op": "subscribe", "auth_token": format!("token-{n}")}))
            }
        }

        let transport = MockTransport::new(
            vec![vec![event("orders", 1)], vec![event("orders", 2)]],
            true,
        );
        let runtime = runtime(Arc::clone(&transport));
        let auth = Arc::new(CountingAuth(AtomicU64::new(0)));
        let mut orders = runtime.subscribe(
            ChannelSpec::new("orders", serde_json::json!({})).with_auth(auth),
        ).unwrap();

        assert_eq!(orders.next().await.unwrap().unwrap()["id"], 1);
        assert_eq!(orders.next().await.unwrap().unwrap()["id"], 2);

        let texts = transport.sent_texts();
        assert!(texts.iter().any(|text| text.contains("token-0")));
        assert!(texts.iter().any(|text| text.contains("token-1")));
        runtime.disconnect().await;
    }

    #[tokio::test]
    async fn test_server_ping_answered_with_pong() {
        let transport = MockTransport::new(
            vec![vec![WsFrame::Ping(vec![1, 2]), event("book", 1)]],
            false,
        );
        let runtime = runtime(Arc::clone(&transport));
        let mut book = runtime.subscribe(ChannelSpec::new(
            "book",
            serde_json::json!({"op": "subscribe"}),
        )).unwrap();
        let _ = book.next().await;
        assert!(transport
            .sent
            .lock()
            .iter()
            .any(|frame| matches!(frame, WsFrame::Pong(payload) if payload == &vec![1, 2])));
        runtime.disconnect().await;
    }
}
