//! Inquiry router: the one generic responder between the topic and a provider.
//!
//! Each router is parameterised by a provider capability. It listens on the
//! search topic, discards broadcasts whose selector names another provider,
//! and for every broadcast it accepts publishes exactly one
//! [`ProviderResponse`] to the response queue, success or failure. The
//! coordinator relies on that to finish searches.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::bus::{Queue, Subscription};
use crate::error::SearchError;
use crate::message::{Envelope, Payload};
use crate::provider::FlightProvider;
use crate::types::{ProviderRequest, ProviderResponse};

/// Routes broadcast search requests to a single provider.
#[derive(Clone)]
pub struct InquiryRouter {
    provider: Arc<dyn FlightProvider>,
    queue: Queue,
}

impl InquiryRouter {
    pub fn new(provider: Arc<dyn FlightProvider>, queue: Queue) -> Self {
        Self { provider, queue }
    }

    pub fn provider_id(&self) -> &str {
        self.provider.id()
    }

    /// Scatter filter: the sub-request for this provider, or `None` if the
    /// envelope is not addressed to it.
    pub fn accept(&self, envelope: &Envelope) -> Option<ProviderRequest> {
        let Payload::SearchRequested(dispatch) = &envelope.payload else {
            tracing::trace!(
                provider = %self.provider_id(),
                kind = %envelope.kind,
                "router ignoring non-request payload"
            );
            return None;
        };
        if !dispatch.selector.matches(self.provider_id()) {
            tracing::debug!(
                provider = %self.provider_id(),
                search_id = %dispatch.search_id,
                selector = %dispatch.selector,
                "broadcast addressed to another provider, discarded"
            );
            return None;
        }
        Some(ProviderRequest {
            search_id: dispatch.search_id.clone(),
            provider_id: self.provider_id().to_owned(),
            request: dispatch.request.clone(),
        })
    }

    /// Consult the provider and turn whatever happens into one response.
    ///
    /// Provider errors and panics both become a failure response carrying
    /// the reason; this never returns without a response.
    pub async fn respond(&self, request: &ProviderRequest) -> ProviderResponse {
        let provider_id = self.provider_id();
        // The call itself runs inside the guard: a provider may panic before
        // its future exists.
        let outcome = AssertUnwindSafe(async { self.provider.search(request).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(reply)) => {
                if reply.provider_id != provider_id {
                    tracing::warn!(
                        provider = %provider_id,
                        reported = %reply.provider_id,
                        "provider reply carries a foreign id, using the router's"
                    );
                }
                tracing::debug!(
                    provider = %provider_id,
                    search_id = %request.search_id,
                    success = reply.success,
                    offers = reply.offers.len(),
                    elapsed_ms = reply.elapsed.as_millis() as u64,
                    "provider replied"
                );
                ProviderResponse {
                    search_id: request.search_id.clone(),
                    provider_id: provider_id.to_owned(),
                    offers: if reply.success { reply.offers } else { Vec::new() },
                    success: reply.success,
                    error: reply.error,
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    provider = %provider_id,
                    search_id = %request.search_id,
                    error = %e,
                    "provider call failed"
                );
                ProviderResponse::failure(request.search_id.clone(), provider_id, e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(
                    provider = %provider_id,
                    search_id = %request.search_id,
                    reason = %reason,
                    "provider call panicked"
                );
                ProviderResponse::failure(
                    request.search_id.clone(),
                    provider_id,
                    format!("internal error: {reason}"),
                )
            }
        }
    }

    /// Handle one broadcast: filter, consult the provider, publish the
    /// response. Returns `Ok(false)` when the envelope was filtered out.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Channel`] if the response queue is closed.
    pub async fn handle(&self, envelope: &Envelope) -> Result<bool, SearchError> {
        let Some(request) = self.accept(envelope) else {
            return Ok(false);
        };
        let response = self.respond(&request).await;
        self.queue.publish(response)?;
        Ok(true)
    }

    /// Listen on `subscription` until `cancel` fires or the topic closes.
    ///
    /// Each accepted request is served on its own task in `tracker`, so a
    /// slow provider never delays the next broadcast. A request still in
    /// flight at shutdown is abandoned without a response.
    pub async fn run(
        self,
        mut subscription: Subscription,
        cancel: CancellationToken,
        tracker: TaskTracker,
    ) {
        tracing::info!(provider = %self.provider_id(), "inquiry router started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                next = subscription.recv() => {
                    let Some(envelope) = next else {
                        tracing::warn!(provider = %self.provider_id(), "search topic closed");
                        break;
                    };
                    let Some(request) = self.accept(&envelope) else {
                        continue;
                    };
                    let router = self.clone();
                    let cancel = cancel.clone();
                    tracker.spawn(async move {
                        tokio::select! {
                            () = cancel.cancelled() => {
                                tracing::debug!(
                                    provider = %router.provider_id(),
                                    search_id = %request.search_id,
                                    "in-flight provider call abandoned at shutdown"
                                );
                            }
                            response = router.respond(&request) => {
                                if let Err(e) = router.queue.publish(response) {
                                    tracing::error!(
                                        provider = %router.provider_id(),
                                        search_id = %request.search_id,
                                        error = %e,
                                        "failed to publish provider response"
                                    );
                                }
                            }
                        }
                    });
                }
            }
        }
        tracing::info!(provider = %self.provider_id(), "inquiry router stopped");
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
