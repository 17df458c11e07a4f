//! Aggregator loop: drains the response queue into the coordinator.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::bus::Queue;
use crate::coordinator::SearchCoordinator;
use crate::message::Payload;
use crate::router::panic_message;
use crate::store::SearchStore;

/// Consume `queue` until `cancel` fires, feeding every provider response to
/// `coordinator`.
///
/// A message that cannot be processed is logged and skipped; nothing short of
/// cancellation ends the loop. Returns the number of messages consumed.
pub async fn run_aggregator<S: SearchStore>(
    coordinator: Arc<SearchCoordinator<S>>,
    queue: Queue,
    cancel: CancellationToken,
) -> u64 {
    let mut stream = Box::pin(queue.consume());
    let mut consumed = 0u64;
    tracing::info!(queue = %queue.name(), "aggregator started");

    loop {
        let envelope = tokio::select! {
            () = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some(envelope) => envelope,
                None => {
                    tracing::warn!(queue = %queue.name(), "response queue closed");
                    break;
                }
            },
        };
        consumed += 1;

        let Payload::ProviderResponded(response) = envelope.payload else {
            tracing::warn!(
                message_id = %envelope.id,
                kind = %envelope.kind,
                "unexpected payload on response queue, skipped"
            );
            continue;
        };

        let search_id = response.search_id.clone();
        let processed = AssertUnwindSafe(coordinator.process_provider_response(response))
            .catch_unwind()
            .await;
        match processed {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(
                message_id = %envelope.id,
                %search_id,
                error = %e,
                "failed to process provider response"
            ),
            Err(panic) => tracing::error!(
                message_id = %envelope.id,
                %search_id,
                reason = %panic_message(panic.as_ref()),
                "provider response handler panicked, skipped"
            ),
        }
    }

    tracing::info!(queue = %queue.name(), consumed, "aggregator stopped");
    consumed
}
