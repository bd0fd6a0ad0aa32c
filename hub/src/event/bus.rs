//! In-process publish-subscribe with bounded replay.
//!
//! Publishers append to a bounded ring and fan copies out to subscriber
//! channels. Delivery is best-effort: a subscriber that cannot keep up is
//! evicted, never blocked on. A background ticker pings subscribers every
//! 30 s and evicts those whose last successful write is stale.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::{EventPayload, EventType, HubEvent};
use crate::metrics::HubMetrics;

/// Most-recent events retained for replay.
pub const REPLAY_BUFFER_SIZE: usize = 100;
/// Historical events delivered to a new subscriber.
pub const REPLAY_ON_SUBSCRIBE: usize = 10;
/// Ping cadence.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);
/// A subscriber with no successful write for this long is evicted.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

struct Subscriber {
    tx: mpsc::Sender<HubEvent>,
    /// Empty set = all event types.
    filter: HashSet<EventType>,
    connected_at: DateTime<Utc>,
    last_write: Mutex<Instant>,
}

impl Subscriber {
    fn wants(&self, event_type: EventType) -> bool {
        self.filter.is_empty() || self.filter.contains(&event_type)
    }
}

pub struct EventBus {
    ring: Mutex<VecDeque<HubEvent>>,
    subscribers: DashMap<Uuid, Arc<Subscriber>>,
    queue_capacity: usize,
    cancel: CancellationToken,
    shut_down: AtomicBool,
    metrics: Arc<HubMetrics>,
}

impl EventBus {
    pub fn new(queue_capacity: usize, metrics: Arc<HubMetrics>) -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(REPLAY_BUFFER_SIZE)),
            subscribers: DashMap::new(),
            queue_capacity: queue_capacity.max(REPLAY_ON_SUBSCRIBE),
            cancel: CancellationToken::new(),
            shut_down: AtomicBool::new(false),
            metrics,
        }
    }

    /// Publish an event: append to the replay ring, fan out to matching
    /// subscribers. A failed enqueue (closed or full channel) evicts the
    /// subscriber immediately. No-op after shutdown.
    pub fn publish(&self, payload: EventPayload) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        let event = HubEvent::new(payload);
        let event_type = event.event_type();

        let mut ring = self.ring.lock();
        if ring.len() == REPLAY_BUFFER_SIZE {
            ring.pop_front();
        }
        ring.push_back(event.clone());

        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            if !entry.value().wants(event_type) {
                continue;
            }
            if self.deliver(entry.value(), event.clone()) {
                continue;
            }
            dead.push(*entry.key());
        }
        drop(ring);

        for id in dead {
            self.evict(id, "write failed");
        }
        self.metrics.record_event_published();
    }

    /// Register a subscriber. Up to the 10 most-recent matching events are
    /// replayed onto the channel before live delivery begins. An empty
    /// filter subscribes to everything.
    pub fn subscribe(&self, filter: HashSet<EventType>) -> (Uuid, mpsc::Receiver<HubEvent>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = Uuid::new_v4();
        let subscriber = Arc::new(Subscriber {
            tx,
            filter,
            connected_at: Utc::now(),
            last_write: Mutex::new(Instant::now()),
        });

        // Replay and registration happen under the ring lock so a concurrent
        // publish cannot slip in between and be seen out of order.
        let ring = self.ring.lock();
        let replay: Vec<HubEvent> = ring
            .iter()
            .filter(|event| subscriber.wants(event.event_type()))
            .cloned()
            .collect();
        let start = replay.len().saturating_sub(REPLAY_ON_SUBSCRIBE);
        for event in &replay[start..] {
            self.deliver(&subscriber, event.clone());
        }
        self.subscribers.insert(id, Arc::clone(&subscriber));
        drop(ring);

        debug!(subscriber = %id, "event subscriber attached");
        (id, rx)
    }

    /// Explicitly detach a subscriber (e.g. the SSE connection closed).
    pub fn unsubscribe(&self, id: Uuid) {
        if self.subscribers.remove(&id).is_some() {
            debug!(subscriber = %id, "event subscriber detached");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn buffered_events(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn subscriber_connected_at(&self, id: Uuid) -> Option<DateTime<Utc>> {
        self.subscribers.get(&id).map(|s| s.connected_at)
    }

    /// Start the ping/eviction ticker. Runs until [`EventBus::shutdown`].
    pub fn start_ticker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let bus = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PING_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so pings start one
            // interval after boot.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => bus.ping_and_evict(),
                }
            }
        })
    }

    /// Send a ping to every subscriber and evict the stale ones.
    ///
    /// Pings bypass subscriber filters: they are liveness probes, not data.
    fn ping_and_evict(&self) {
        let ping = HubEvent::new(EventPayload::Ping);
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            if subscriber.last_write.lock().elapsed() > IDLE_TIMEOUT {
                dead.push((*entry.key(), "idle timeout"));
                continue;
            }
            if !self.deliver(subscriber, ping.clone()) {
                dead.push((*entry.key(), "ping failed"));
            }
        }
        for (id, reason) in dead {
            self.evict(id, reason);
        }
    }

    /// Stop the ticker and drop all subscribers. Idempotent; publishes after
    /// shutdown are silently discarded.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.subscribers.clear();
        debug!("event bus shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn deliver(&self, subscriber: &Subscriber, event: HubEvent) -> bool {
        match subscriber.tx.try_send(event) {
            Ok(()) => {
                *subscriber.last_write.lock() = Instant::now();
                true
            }
            Err(_) => false,
        }
    }

    fn evict(&self, id: Uuid, reason: &str) {
        if self.subscribers.remove(&id).is_some() {
            warn!(subscriber = %id, reason, "evicting event subscriber");
            self.metrics.record_subscriber_evicted();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> Arc<EventBus> {
        Arc::new(EventBus::new(64, Arc::new(HubMetrics::new())))
    }

    fn alert(n: usize) -> EventPayload {
        EventPayload::SystemAlert {
            level: "info".into(),
            message: format!("alert-{n}"),
        }
    }

    fn execution(n: usize) -> EventPayload {
        EventPayload::ToolExecution {
            tool: format!("tool-{n}"),
            server: "math".into(),
            group: "default".into(),
            success: true,
            duration_ms: 1,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_live_subscriber() {
        let bus = bus();
        let (_id, mut rx) = bus.subscribe(HashSet::new());
        bus.publish(alert(1));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), EventType::SystemAlert);
    }

    #[tokio::test]
    async fn test_filter_excludes_other_types() {
        let bus = bus();
        let (_id, mut rx) = bus.subscribe(HashSet::from([EventType::ToolExecution]));
        bus.publish(alert(1));
        bus.publish(execution(1));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), EventType::ToolExecution);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replay_is_bounded_and_filtered() {
        let bus = bus();
        for n in 0..3 {
            bus.publish(execution(n));
        }
        for n in 0..5 {
            bus.publish(alert(n));
        }
        let (_id, mut rx) = bus.subscribe(HashSet::from([EventType::ToolExecution]));
        for n in 0..3 {
            let event = rx.recv().await.unwrap();
            match event.payload {
                EventPayload::ToolExecution { tool, .. } => {
                    assert_eq!(tool, format!("tool-{n}"));
                }
                other => panic!("expected tool_execution, got {:?}", other),
            }
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replay_caps_at_ten() {
        let bus = bus();
        for n in 0..25 {
            bus.publish(execution(n));
        }
        let (_id, mut rx) = bus.subscribe(HashSet::new());
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.len(), REPLAY_ON_SUBSCRIBE);
        match &seen[0].payload {
            EventPayload::ToolExecution { tool, .. } => assert_eq!(tool, "tool-15"),
            other => panic!("expected tool_execution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ring_drops_oldest_beyond_capacity() {
        let bus = bus();
        for n in 0..(REPLAY_BUFFER_SIZE + 20) {
            bus.publish(alert(n));
        }
        assert_eq!(bus.buffered_events(), REPLAY_BUFFER_SIZE);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_evicted_on_publish() {
        let bus = bus();
        let (_id, rx) = bus.subscribe(HashSet::new());
        drop(rx);
        assert_eq!(bus.subscriber_count(), 1);
        bus.publish(alert(1));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_arrives_within_interval() {
        let bus = bus();
        let _ticker = bus.start_ticker();
        let (_id, mut rx) = bus.subscribe(HashSet::from([EventType::ToolExecution]));
        tokio::time::sleep(PING_INTERVAL + Duration::from_secs(1)).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), EventType::Ping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_subscriber_evicted_by_ticker() {
        let bus = bus();
        let _ticker = bus.start_ticker();
        let (_id, rx) = bus.subscribe(HashSet::new());
        drop(rx);
        tokio::time::sleep(PING_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscriber_evicted() {
        // Queue capacity of 10 (the replay minimum) fills quickly once the
        // receiver stops draining; after that no write succeeds and the
        // ticker drops the subscriber.
        let bus = Arc::new(EventBus::new(REPLAY_ON_SUBSCRIBE, Arc::new(HubMetrics::new())));
        let _ticker = bus.start_ticker();
        let (_id, rx) = bus.subscribe(HashSet::new());
        for n in 0..REPLAY_ON_SUBSCRIBE {
            bus.publish(alert(n));
        }
        // Queue is now full; receiver never drains but stays open.
        tokio::time::sleep(IDLE_TIMEOUT + PING_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(bus.subscriber_count(), 0);
        drop(rx);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_silences_publish() {
        let bus = bus();
        let (_id, mut rx) = bus.subscribe(HashSet::new());
        bus.shutdown();
        bus.shutdown();
        bus.publish(alert(1));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(rx.recv().await.is_none());
    }
}
