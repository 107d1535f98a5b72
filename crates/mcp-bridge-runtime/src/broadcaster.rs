//! Fan-out of bridge events to client subscriptions.
//!
//! Each subscription owns a bounded queue. Publishing never waits: when a
//! queue is full its oldest event is dropped and counted, and the subscriber
//! receives a single coalesced `Overflow { dropped }` marker ahead of the
//! events that survived.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use futures_util::Stream;
use tokio::sync::Notify;

use mcp_bridge_core::{BridgeEvent, BridgeEventEmitter};

/// Which servers a subscription wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubscriptionFilter {
    #[default]
    All,
    Servers(HashSet<String>),
}

impl SubscriptionFilter {
    /// Filter from a list of server ids; an empty list means all servers.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: HashSet<String> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            Self::All
        } else {
            Self::Servers(ids)
        }
    }

    /// Overflow markers carry no server id and are never filtered.
    fn matches(&self, event: &BridgeEvent) -> bool {
        match (self, event.server_id()) {
            (Self::All, _) | (_, None) => true,
            (Self::Servers(ids), Some(id)) => ids.contains(id),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<BridgeEvent>,
    /// Events dropped since the subscriber last received one.
    dropped: u64,
}

#[derive(Debug)]
struct SubscriberQueue {
    filter: SubscriptionFilter,
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn push(&self, event: BridgeEvent) -> bool {
        let overflowed = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let overflowed = state.events.len() >= self.capacity;
            if overflowed {
                state.events.pop_front();
                state.dropped += 1;
            }
            state.events.push_back(event);
            overflowed
        };
        self.notify.notify_one();
        overflowed
    }

    fn pop(&self) -> Option<BridgeEvent> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.dropped > 0 {
            let dropped = std::mem::take(&mut state.dropped);
            return Some(BridgeEvent::overflow(dropped));
        }
        state.events.pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

type Registry = RwLock<HashMap<u64, Arc<SubscriberQueue>>>;

/// Publishes events to every matching subscription.
///
/// Clones share the same set of subscriptions.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    subscribers: Arc<Registry>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl EventBroadcaster {
    /// Broadcaster whose subscriptions buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    /// Open a subscription. It is removed when the [`Subscription`] drops.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue {
            filter,
            capacity: self.capacity,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection_id, Arc::clone(&queue));
        tracing::debug!(connection_id, "Event subscription opened");

        Subscription {
            connection_id,
            queue,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Deliver `event` to every subscription whose filter matches.
    pub fn publish(&self, event: &BridgeEvent) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for (connection_id, queue) in subscribers.iter() {
            if queue.filter.matches(event) && queue.push(event.clone()) {
                tracing::debug!(connection_id, "Subscriber queue full, dropped oldest event");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// End every open subscription (used on shutdown).
    pub fn close_all(&self) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for queue in subscribers.values() {
            queue.close();
        }
        subscribers.clear();
    }
}

impl BridgeEventEmitter for EventBroadcaster {
    fn emit(&self, event: BridgeEvent) {
        tracing::trace!(event_type = event.event_type(), server_id = ?event.server_id(), "Publishing event");
        self.publish(&event);
    }

    fn clone_box(&self) -> Box<dyn BridgeEventEmitter> {
        Box::new(self.clone())
    }
}

/// A client's event stream. Dropping it unregisters immediately.
#[derive(Debug)]
pub struct Subscription {
    connection_id: u64,
    queue: Arc<SubscriberQueue>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub const fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Next event, waiting if none is queued.
    ///
    /// Returns `None` once the broadcaster closed the subscription and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        loop {
            if let Some(event) = self.queue.pop() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::Acquire) || self.registry.strong_count() == 0 {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Next event if one is queued.
    pub fn try_recv(&mut self) -> Option<BridgeEvent> {
        self.queue.pop()
    }

    pub fn into_stream(self) -> impl Stream<Item = BridgeEvent> + Send + 'static {
        futures_util::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.connection_id);
            tracing::debug!(connection_id = self.connection_id, "Event subscription closed");
        }
    }
}
