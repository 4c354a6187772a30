//! Per-consumer event delivery.
//!
//! Each consumer of a channel owns an [`Inbox`]-backed [`EventStream`]: a
//! lazy, non-restartable sequence of already-routed events. Backpressure
//! is bounded per consumer — when the buffer is full the oldest event is
//! dropped and counted.

use futures::Stream;
use kestrel_markets::{VenueError, VenueResult};
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tokio::sync::mpsc;

/// Deterministic channel identifier, e.g. `orderbook:BTC/USDT:USDT`.
pub type ChannelId = SmolStr;

#[derive(Debug)]
enum Item {
    Event(serde_json::Value),
    Error(VenueError),
}

#[derive(Debug)]
struct InboxState {
    queue: VecDeque<Item>,
    closed: bool,
    waker: Option<Waker>,
}

/// Bounded drop-oldest buffer feeding one [`EventStream`].
#[derive(Debug)]
pub(crate) struct Inbox {
    state: Mutex<InboxState>,
    capacity: usize,
    dropped: AtomicU64,
}

impl Inbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(InboxState {
                queue: VecDeque::new(),
                closed: false,
                waker: None,
            }),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Returns true when an event was evicted to make room.
    pub(crate) fn push(&self, event: serde_json::Value) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        let mut evicted = false;
        if state.queue.len() >= self.capacity {
            state.queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            evicted = true;
        }
        state.queue.push_back(Item::Event(event));
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
        evicted
    }

    /// Deliver a terminal error, then end-of-stream.
    pub(crate) fn fail(&self, error: VenueError) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.queue.push_back(Item::Error(error));
        state.closed = true;
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    /// End-of-stream without an error.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Commands consumers and the runtime exchange.
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe(ChannelId),
    ConsumerDropped(ChannelId, u64),
    Disconnect,
}

/// A lazy, non-restartable sequence of routed events for one consumer.
///
/// Dropping the stream decrements the channel's consumer count; at zero
/// the runtime sends the venue's unsubscribe frame.
#[derive(Debug)]
pub struct EventStream {
    channel: ChannelId,
    consumer_id: u64,
    inbox: Arc<Inbox>,
    commands: mpsc::UnboundedSender<Command>,
}

impl EventStream {
    pub(crate) fn new(
        channel: ChannelId,
        consumer_id: u64,
        inbox: Arc<Inbox>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            channel,
            consumer_id,
            inbox,
            commands,
        }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Events evicted from this consumer's buffer so far.
    pub fn dropped_events(&self) -> u64 {
        self.inbox.dropped()
    }
}

impl Stream for EventStream {
    type Item = VenueResult<serde_json::Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut state = self.inbox.state.lock();
        match state.queue.pop_front() {
            Some(Item::Event(event)) => Poll::Ready(Some(Ok(event))),
            Some(Item::Error(error)) => Poll::Ready(Some(Err(error))),
            None if state.closed => Poll::Ready(None),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::ConsumerDropped(
            self.channel.clone(),
            self.consumer_id,
        ));
    }
}
