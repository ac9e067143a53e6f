//! In-process notification bus. It decouples transport events and inbound
//! control messages from the collaborators that consume them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Topics carried by the bus. The set is closed: every topic has exactly one
/// payload shape, carried by the matching [`Event`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// The uplink completed a handshake and is ready for traffic
    Opened,
    /// The uplink transport closed, for any reason
    Closed,
    /// A screened inbound frame, forwarded verbatim as text
    Message,
    /// The device LED changed state
    LedStatus,
}

/// A published notification and its payload
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Opened,
    Closed,
    Message(String),
    LedStatus(bool),
}

impl Event {
    /// The topic this event is delivered on
    pub fn topic(&self) -> Topic {
        match self {
            Event::Opened => Topic::Opened,
            Event::Closed => Topic::Closed,
            Event::Message(_) => Topic::Message,
            Event::LedStatus(_) => Topic::LedStatus,
        }
    }
}

/// Cheaply cloneable publish/subscribe handle.
///
/// Publishing fans out to the subscribers registered at that moment, in
/// registration order, without blocking: each subscriber gets its own queued
/// copy of the event. A subscription made while a publish is in flight only
/// sees later events. Dropping a [`Subscription`] unsubscribes it; the bus
/// prunes it on the next publish to its topic.
#[derive(Clone, Default)]
pub struct Bus {
    subscribers: Arc<Mutex<HashMap<Topic, Vec<mpsc::UnboundedSender<Event>>>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber for a single topic
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("bus subscriber table lock poisoned")
            .entry(topic)
            .or_default()
            .push(tx);
        Subscription { rx }
    }

    /// Delivers `event` to every current subscriber of its topic
    pub fn publish(&self, event: Event) {
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("bus subscriber table lock poisoned");
        if let Some(entries) = subscribers.get_mut(&event.topic()) {
            // A failed send means the subscription was dropped
            entries.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers
            .lock()
            .expect("bus subscriber table lock poisoned")
            .get(&topic)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Receiving end of a single-topic subscription
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Subscription {
    /// Waits for the next event on the subscribed topic. Returns `None` once
    /// the bus is dropped and all queued events have been consumed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
