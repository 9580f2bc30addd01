//! Session event stream.
//!
//! Every event carries a sequence number assigned by the session's [`EventBus`].
//! Subscribers may attach at any time:
//! 1. The bus replays its history into the new subscriber's queue
//! 2. Live events follow in publish order
//! 3. Closing the bus ends every subscription once its queue drains
//!
//! Queues are bounded softly. When a queue is full, older progress statuses are
//! coalesced so only the latest survives. Content, done, error and transition
//! events are never dropped, even if that takes a queue past its capacity.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use uuid::Uuid;

use offer_facts::TermsBlock;

use super::SessionState;
use crate::draft::{ContentOrigin, SectionStatus};

/// Buffer sizes for the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Events queued per subscriber before progress statuses are coalesced.
    pub subscriber_capacity: usize,

    /// Events kept for replay before progress statuses are coalesced.
    pub history_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 256,
            history_capacity: 4096,
        }
    }
}

/// A status update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusUpdate {
    /// The session moved between states.
    Transition {
        from: SessionState,
        to: SessionState,
        message: String,
    },
    /// Progress inside the current state.
    Progress {
        section: Option<usize>,
        message: String,
    },
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Status(StatusUpdate),
    Content {
        section: usize,
        delta: String,
        attempt: u32,
        origin: ContentOrigin,
    },
    Done {
        section: usize,
        heading: String,
        text: String,
        word_count: usize,
        status: SectionStatus,
        terms: Vec<TermsBlock>,
    },
    Error {
        section: Option<usize>,
        message: String,
    },
}

impl EventPayload {
    /// Only progress statuses may be coalesced under backpressure.
    pub fn is_coalescible(&self) -> bool {
        matches!(self, EventPayload::Status(StatusUpdate::Progress { .. }))
    }

    /// The state entered, for transition events.
    pub fn transition_to(&self) -> Option<SessionState> {
        match self {
            EventPayload::Status(StatusUpdate::Transition { to, .. }) => Some(*to),
            _ => None,
        }
    }
}

/// A sequenced session event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Strictly increasing within a session, starting at 1.
    pub seq: u64,
    pub session_id: Uuid,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl SessionEvent {
    /// Serialize to a JSON object, e.g. for a server-sent event body.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Push onto a bounded queue, coalescing progress statuses when it is full.
///
/// Returns how many events were dropped.
fn push_coalescing(queue: &mut VecDeque<SessionEvent>, event: SessionEvent, capacity: usize) -> usize {
    let mut dropped = 0;
    if queue.len() >= capacity {
        let before = queue.len();
        if event.payload.is_coalescible() {
            queue.retain(|queued| !queued.payload.is_coalescible());
        } else if let Some(latest) = queue.iter().rposition(|queued| queued.payload.is_coalescible()) {
            let mut position = 0;
            queue.retain(|queued| {
                let keep = !queued.payload.is_coalescible() || position == latest;
                position += 1;
                keep
            });
        }
        dropped = before - queue.len();
    }
    queue.push_back(event);
    dropped
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<SessionEvent>,
    closed: bool,
    coalesced: u64,
}

#[derive(Debug, Default)]
struct SubscriberQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

#[derive(Debug)]
struct BusState {
    next_seq: u64,
    history: VecDeque<SessionEvent>,
    subscribers: Vec<Arc<SubscriberQueue>>,
    closed: bool,
}

/// Fan-out of session events with replay.
///
/// Only the session orchestrator publishes. Any number of observers subscribe.
#[derive(Debug, Clone)]
pub struct EventBus {
    session_id: Uuid,
    config: EventConfig,
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    pub fn new(session_id: Uuid, config: EventConfig) -> Self {
        Self {
            session_id,
            config,
            state: Arc::new(Mutex::new(BusState {
                next_seq: 1,
                history: VecDeque::new(),
                subscribers: Vec::new(),
                closed: false,
            })),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Publish an event and return its sequence number.
    ///
    /// Returns `None` once the bus is closed.
    pub fn publish(&self, payload: EventPayload) -> Option<u64> {
        let mut bus = lock(&self.state);
        if bus.closed {
            return None;
        }

        let seq = bus.next_seq;
        bus.next_seq += 1;
        let event = SessionEvent {
            seq,
            session_id: self.session_id,
            payload,
        };

        push_coalescing(&mut bus.history, event.clone(), self.config.history_capacity.max(1));

        // Subscriptions that were dropped hold no other reference to their queue.
        bus.subscribers.retain(|queue| Arc::strong_count(queue) > 1);
        let capacity = self.config.subscriber_capacity.max(1);
        for queue in &bus.subscribers {
            {
                let mut state = lock(&queue.state);
                let dropped = push_coalescing(&mut state.events, event.clone(), capacity);
                state.coalesced += dropped as u64;
            }
            queue.notify.notify_one();
        }
        Some(seq)
    }

    /// Attach an observer. It first receives the replay history, then live events.
    pub fn subscribe(&self) -> EventSubscription {
        let mut bus = lock(&self.state);
        let queue = Arc::new(SubscriberQueue {
            state: Mutex::new(QueueState {
                events: bus.history.clone(),
                closed: bus.closed,
                coalesced: 0,
            }),
            notify: Notify::new(),
        });
        if !bus.closed {
            bus.subscribers.push(Arc::clone(&queue));
        }
        EventSubscription { queue, last_seq: 0 }
    }

    /// Stop accepting events. Subscribers drain what they have and then end.
    pub fn close(&self) {
        let mut bus = lock(&self.state);
        bus.closed = true;
        for queue in bus.subscribers.drain(..) {
            lock(&queue.state).closed = true;
            queue.notify.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Sequence number of the latest event, 0 when nothing was published.
    pub fn last_seq(&self) -> u64 {
        lock(&self.state).next_seq - 1
    }

    /// Snapshot of the replay history.
    pub fn history(&self) -> Vec<SessionEvent> {
        lock(&self.state).history.iter().cloned().collect()
    }
}

enum Next {
    Event(SessionEvent),
    Empty,
    Closed,
}

/// A single observer's view of the event stream.
///
/// Events with a sequence number at or below the last one returned are skipped,
/// so re-delivered events are harmless.
#[derive(Debug)]
pub struct EventSubscription {
    queue: Arc<SubscriberQueue>,
    last_seq: u64,
}

impl EventSubscription {
    /// Wait for the next event. Returns `None` after the bus closes and the queue drains.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        let queue = Arc::clone(&self.queue);
        loop {
            let notified = queue.notify.notified();
            match self.poll_queue() {
                Next::Event(event) => return Some(event),
                Next::Closed => return None,
                Next::Empty => notified.await,
            }
        }
    }

    /// Take the next queued event without waiting.
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        match self.poll_queue() {
            Next::Event(event) => Some(event),
            Next::Empty | Next::Closed => None,
        }
    }

    /// Drain the stream until the bus closes.
    pub async fn collect(mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }

    /// Sequence number of the last event returned.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Progress statuses dropped from this subscriber's queue under backpressure.
    pub fn coalesced(&self) -> u64 {
        lock(&self.queue.state).coalesced
    }

    fn poll_queue(&mut self) -> Next {
        let mut state = lock(&self.queue.state);
        while let Some(event) = state.events.pop_front() {
            if event.seq > self.last_seq {
                self.last_seq = event.seq;
                return Next::Event(event);
            }
        }
        if state.closed {
            Next::Closed
        } else {
            Next::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn progress(message: &str) -> EventPayload {
        EventPayload::Status(StatusUpdate::Progress {
            section: None,
            message: message.to_string(),
        })
    }

    fn content(section: usize, delta: &str) -> EventPayload {
        EventPayload::Content {
            section,
            delta: delta.to_string(),
            attempt: 1,
            origin: ContentOrigin::Generated,
        }
    }

    fn bus_with_capacity(capacity: usize) -> EventBus {
        EventBus::new(
            Uuid::new_v4(),
            EventConfig {
                subscriber_capacity: capacity,
                history_capacity: 1024,
            },
        )
    }

    #[test]
    fn test_sequence_numbers_start_at_one() {
        let bus = bus_with_capacity(8);
        assert_eq!(bus.last_seq(), 0);
        assert_eq!(bus.publish(progress("a")), Some(1));
        assert_eq!(bus.publish(progress("b")), Some(2));
        assert_eq!(bus.last_seq(), 2);

        bus.close();
        assert_eq!(bus.publish(progress("c")), None);
        assert_eq!(bus.last_seq(), 2);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_replay_then_live() {
        let bus = bus_with_capacity(8);
        bus.publish(progress("before"));
        bus.publish(content(0, "Hello "));

        let subscription = bus.subscribe();
        bus.publish(content(0, "world"));
        bus.close();

        let seqs: Vec<u64> = subscription.collect().await.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_subscribe_after_close_replays_history() {
        let bus = bus_with_capacity(8);
        bus.publish(progress("only"));
        bus.close();

        let events = bus.subscribe().collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, progress("only"));
    }

    #[tokio::test]
    async fn test_waiting_subscriber_wakes_on_publish() {
        let bus = bus_with_capacity(8);
        let mut subscription = bus.subscribe();
        let publisher = bus.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish(content(0, "late"));
            publisher.close();
        });

        let event = tokio::time::timeout(Duration::from_secs(1), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.seq, 1);
        assert!(subscription.next().await.is_none());
    }

    #[test]
    fn test_overflow_coalesces_progress_but_keeps_content() {
        let bus = bus_with_capacity(3);
        let mut subscription = bus.subscribe();

        bus.publish(progress("p1"));
        bus.publish(content(0, "a "));
        bus.publish(progress("p2"));
        bus.publish(content(0, "b "));
        bus.publish(progress("p3"));
        bus.publish(content(0, "c"));

        let mut received = Vec::new();
        while let Some(event) = subscription.try_next() {
            received.push(event.payload);
        }

        let deltas: Vec<&str> = received
            .iter()
            .filter_map(|p| match p {
                EventPayload::Content { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["a ", "b ", "c"]);

        let statuses: Vec<&EventPayload> = received.iter().filter(|p| p.is_coalescible()).collect();
        assert_eq!(statuses, vec![&progress("p3")]);
        assert_eq!(subscription.coalesced(), 2);
    }

    #[test]
    fn test_transitions_never_coalesced() {
        let bus = bus_with_capacity(1);
        let mut subscription = bus.subscribe();
        for (from, to) in [
            (SessionState::Created, SessionState::Planning),
            (SessionState::Planning, SessionState::Drafting),
        ] {
            bus.publish(EventPayload::Status(StatusUpdate::Transition {
                from,
                to,
                message: String::new(),
            }));
        }

        assert_eq!(
            subscription.try_next().and_then(|e| e.payload.transition_to()),
            Some(SessionState::Planning)
        );
        assert_eq!(
            subscription.try_next().and_then(|e| e.payload.transition_to()),
            Some(SessionState::Drafting)
        );
        assert_eq!(subscription.coalesced(), 0);
    }

    #[test]
    fn test_duplicate_sequence_numbers_skipped() {
        let bus = bus_with_capacity(8);
        let mut subscription = bus.subscribe();
        bus.publish(progress("one"));

        let event = subscription.try_next().unwrap();
        lock(&subscription.queue.state).events.push_back(event.clone());
        bus.publish(progress("two"));

        assert_eq!(subscription.try_next().map(|e| e.seq), Some(2));
        assert!(subscription.try_next().is_none());
    }

    #[test]
    fn test_event_json_shape() {
        let event = SessionEvent {
            seq: 7,
            session_id: Uuid::nil(),
            payload: EventPayload::Status(StatusUpdate::Transition {
                from: SessionState::Created,
                to: SessionState::Planning,
                message: "planning outline".to_string(),
            }),
        };

        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["seq"], 7);
        assert_eq!(value["type"], "status");
        assert_eq!(value["status"], "transition");
        assert_eq!(value["to"], "planning");

        let back: SessionEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
