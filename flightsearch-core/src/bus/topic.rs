//! Multicast broadcast topic.
//!
//! Each [`Topic::subscribe`] call creates an independent unbounded delivery
//! queue. [`Topic::publish`] hands a clone of the envelope to every live
//! subscriber; a subscriber whose [`Subscription`] has been dropped is
//! evicted on the next publish without affecting anyone else.
//!
//! There is no replay: a subscription only sees messages published after it
//! was created.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::message::{Envelope, Payload};

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

struct TopicInner {
    name: String,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Broadcast channel: every current subscriber receives every message.
///
/// Cloning a `Topic` yields another handle to the same subscriber set.
#[derive(Clone)]
pub struct Topic {
    inner: Arc<TopicInner>,
}

/// One subscriber's private, FIFO delivery queue.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Subscription {
    /// Wait for the next message.
    ///
    /// Returns `None` once every [`Topic`] handle has been dropped. This is
    /// cancel-safe: dropping the future never loses a message.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Identifier of this subscription within its topic.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Topic {
    /// Create a topic with no subscribers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TopicInner {
                name: name.into(),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a new subscriber and return its delivery handle.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let total = {
            let mut subscribers = self.subscribers();
            subscribers.push(Subscriber { id, tx });
            subscribers.len()
        };
        tracing::debug!(topic = %self.inner.name, subscriber = id, total, "topic subscriber added");
        Subscription { id, rx }
    }

    /// Wrap `payload` in an envelope and deliver it to every live subscriber.
    ///
    /// Returns the number of subscribers the message was delivered to.
    /// Delivery happens outside the subscriber lock, against a snapshot taken
    /// at call time; concurrent subscribe or eviction only affects later
    /// publishes.
    pub fn publish(&self, payload: impl Into<Payload>) -> usize {
        let envelope = Envelope::new(payload);
        let snapshot: Vec<(u64, mpsc::UnboundedSender<Envelope>)> = self
            .subscribers()
            .iter()
            .map(|s| (s.id, s.tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(envelope.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            self.subscribers().retain(|s| !dead.contains(&s.id));
            tracing::warn!(
                topic = %self.inner.name,
                evicted = ?dead,
                "evicted topic subscribers whose consumer is gone"
            );
        }

        tracing::debug!(
            topic = %self.inner.name,
            message_id = %envelope.id,
            kind = %envelope.kind,
            delivered,
            "broadcast published"
        );
        delivered
    }

    /// Number of subscribers currently registered.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Name the topic was created with.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}
