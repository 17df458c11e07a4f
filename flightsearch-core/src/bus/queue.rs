//! Fan-in work queue.
//!
//! Any number of producers append with [`Queue::publish`]; any number of
//! consumers pull with [`Queue::consume`], and each message is handed to
//! exactly one of them. A message handed to a consumer counts as delivered
//! whether or not the consumer manages to process it.

use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, Mutex};

use crate::error::SearchError;
use crate::message::{Envelope, Payload};

/// Single logical stream with work-queue (not broadcast) semantics.
///
/// Cloning a `Queue` yields another producer/consumer handle on the same
/// stream.
#[derive(Clone)]
pub struct Queue {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Envelope>>>,
}

impl Queue {
    /// Create an empty queue.
    pub fn new(name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: Arc::from(name),
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Wrap `payload` in an envelope and append it to the tail.
    ///
    /// Messages from a single producer keep their order; ordering across
    /// producers is unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Channel`] if the receiving side is gone.
    pub fn publish(&self, payload: impl Into<Payload>) -> Result<Envelope, SearchError> {
        let envelope = Envelope::new(payload);
        self.tx.send(envelope.clone()).map_err(|_| {
            SearchError::Channel(format!("queue {} is closed", self.name))
        })?;
        tracing::debug!(
            queue = %self.name,
            message_id = %envelope.id,
            kind = %envelope.kind,
            "message enqueued"
        );
        Ok(envelope)
    }

    /// Lazily pull messages for as long as the queue lives.
    ///
    /// Several streams may be active at once; they compete for messages and
    /// each message is yielded by exactly one of them. Dropping a stream
    /// between items loses nothing.
    pub fn consume(&self) -> impl Stream<Item = Envelope> + Send + 'static {
        let rx = Arc::clone(&self.rx);
        futures::stream::unfold(rx, |rx| async move {
            let next = rx.lock().await.recv().await;
            next.map(|envelope| (envelope, rx))
        })
    }

    /// Name the queue was created with.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProviderResponse, SearchId};
    use futures::StreamExt;
    use std::collections::HashSet;

    fn response(n: usize) -> ProviderResponse {
        ProviderResponse::failure(SearchId::from(format!("s-{n}")), "A", "x")
    }

    #[tokio::test]
    async fn single_producer_order_is_fifo() {
        let queue = Queue::new("responses");
        for n in 0..5 {
            queue.publish(response(n)).expect("publish");
        }
        let got: Vec<String> = queue
            .consume()
            .take(5)
            .map(|e| e.payload.search_id().to_string())
            .collect()
            .await;
        assert_eq!(got, vec!["s-0", "s-1", "s-2", "s-3", "s-4"]);
    }

    #[tokio::test]
    async fn publish_returns_wrapped_envelope() {
        let queue = Queue::new("responses");
        let envelope = queue.publish(response(7)).expect("publish");
        assert_eq!(envelope.kind, "provider_responded");
        let mut stream = Box::pin(queue.consume());
        let got = stream.next().await.expect("message");
        assert_eq!(got.id, envelope.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn each_message_goes_to_exactly_one_consumer() {
        let queue = Queue::new("responses");
        let total = 200;

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            consumers.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                let mut stream = Box::pin(queue.consume());
                while let Ok(Some(envelope)) =
                    tokio::time::timeout(std::time::Duration::from_millis(200), stream.next())
                        .await
                {
                    ids.push(envelope.id);
                }
                ids
            }));
        }

        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = queue.clone();
            producers.push(tokio::spawn(async move {
                for n in 0..total / 4 {
                    queue.publish(response(p * 1000 + n)).expect("publish");
                }
            }));
        }
        for producer in producers {
            producer.await.expect("producer");
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.expect("consumer"));
        }
        let unique: HashSet<&String> = all.iter().collect();
        assert_eq!(all.len(), total);
        assert_eq!(unique.len(), total);
    }

    #[tokio::test]
    async fn dropped_stream_loses_no_messages() {
        let queue = Queue::new("responses");
        queue.publish(response(1)).expect("publish");
        queue.publish(response(2)).expect("publish");

        {
            let mut first = Box::pin(queue.consume());
            let got = first.next().await.expect("first");
            assert_eq!(got.payload.search_id().as_str(), "s-1");
        }

        let mut second = Box::pin(queue.consume());
        let got = second.next().await.expect("second");
        assert_eq!(got.payload.search_id().as_str(), "s-2");
    }
}
