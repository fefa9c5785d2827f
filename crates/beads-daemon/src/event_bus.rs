// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! In-process event bus: named-subject pub/sub fed by the store's
//! write paths, consumed by the flush manager, the SSE bridge, and
//! (out of scope here) `watch`/`await` CLI clients.
//!
//! Fan-out to an unbounded number of subscribers (the SSE bridge, the
//! flush manager, future `watch` clients) is the defining requirement, so
//! delivery is built on `tokio::sync::broadcast`, whose multi-consumer
//! semantics are built for exactly this; the bounded-ring-buffer-plus-
//! `lagged` backpressure policy is `broadcast`'s native behavior, not
//! something layered on top.

use beads_core::MutationEvent;
use tokio::sync::broadcast;

/// Bound on the per-subject broadcast ring buffer. A subscriber that
/// falls this far behind gets `RecvError::Lagged` instead of unbounded
/// memory growth.
const CHANNEL_CAPACITY: usize = 1024;

/// A named subject a [`MutationEvent`] is published under.
/// `StateChange` covers `state.*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Create,
    Update,
    Delete,
    Status,
    Comment,
    State,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Create => "mutation.create",
            Subject::Update => "mutation.update",
            Subject::Delete => "mutation.delete",
            Subject::Status => "mutation.status",
            Subject::Comment => "mutation.comment",
            Subject::State => "state.*",
        }
    }

    /// The subject a given event type publishes under.
    pub fn for_event_type(event_type: &beads_core::EventType) -> Self {
        use beads_core::EventType;
        match event_type {
            EventType::Create => Subject::Create,
            EventType::Tombstone => Subject::Delete,
            EventType::StatusChange | EventType::Close => Subject::Status,
            EventType::Comment => Subject::Comment,
            EventType::StateChange => Subject::State,
            _ => Subject::Update,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BusEvent {
    pub subject: Subject,
    pub event: MutationEvent,
}

/// Handle shared by every RPC connection handler; `publish` is called
/// once per accepted write, after the store append succeeds so ordering
/// matches the store's own acceptance order.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new() -> (Self, EventReader) {
        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        (Self { tx: tx.clone() }, EventReader { rx })
    }

    /// Publishes an event. At-least-once, per-subject order preserved
    /// (delivery order matches broadcast send order); silently a no-op
    /// when there are currently no subscribers, which `broadcast::Sender`
    /// already treats as success rather than an error.
    pub fn publish(&self, subject: Subject, event: MutationEvent) {
        let _ = self.tx.send(BusEvent { subject, event });
    }

    pub fn subscribe(&self) -> EventReader {
        EventReader { rx: self.tx.subscribe() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new().0
    }
}

/// One subscriber's receive side. A `Lagged` error (the subscriber fell
/// behind the ring buffer) is surfaced to the caller rather than
/// swallowed, so the SSE bridge can synthesize its own `lagged` event.
pub struct EventReader {
    rx: broadcast::Receiver<BusEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    Lagged(u64),
    Closed,
}

impl EventReader {
    pub async fn recv(&mut self) -> Result<BusEvent, RecvOutcome> {
        match self.rx.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(RecvOutcome::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => Err(RecvOutcome::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::EventType;
    use chrono::Utc;

    fn event(id: i64) -> MutationEvent {
        MutationEvent::new(EventType::Create, "bd-1", "Fix login", "alice", Utc::now()).with_payload(id.to_string())
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let (bus, mut reader) = EventBus::new();
        bus.publish(Subject::Create, event(1));
        let received = reader.recv().await.unwrap();
        assert_eq!(received.subject, Subject::Create);
        assert_eq!(received.event.payload, Some("1".to_string()));
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_every_event() {
        let (bus, mut a) = EventBus::new();
        let mut b = bus.subscribe();
        bus.publish(Subject::Update, event(1));
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_lagged_not_a_panic() {
        let (bus, mut reader) = EventBus::new();
        for i in 0..(CHANNEL_CAPACITY as i64 + 10) {
            bus.publish(Subject::Update, event(i));
        }
        let outcome = reader.recv().await;
        assert!(matches!(outcome, Err(RecvOutcome::Lagged(_))));
    }

    #[test]
    fn subject_names_match_wire_contract() {
        assert_eq!(Subject::Create.as_str(), "mutation.create");
        assert_eq!(Subject::Update.as_str(), "mutation.update");
        assert_eq!(Subject::Delete.as_str(), "mutation.delete");
        assert_eq!(Subject::Status.as_str(), "mutation.status");
        assert_eq!(Subject::Comment.as_str(), "mutation.comment");
        assert_eq!(Subject::State.as_str(), "state.*");
    }
}
