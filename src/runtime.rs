//! Process wiring: builds the bus, the store, the providers and the
//! coordinator, starts every background loop and serves HTTP until shutdown.
//!
//! Routers and the completion listener subscribe to the search topic while
//! [`Runtime::start`] runs, before any listener accepts a request, so no
//! search can be broadcast before every router is listening.

use std::sync::Arc;

use flightsearch_core::{
    run_aggregator, InMemorySearchStore, InquiryRouter, Payload, Queue, SearchCoordinator,
    Subscription, Topic,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::providers::build_registry;

const SEARCH_TOPIC: &str = "flight-search-requests";
const RESPONSE_QUEUE: &str = "flight-search-responses";

/// Coordinator type used by the host.
pub type HostCoordinator = SearchCoordinator<InMemorySearchStore>;

/// A running set of background loops around one coordinator.
pub struct Runtime {
    coordinator: Arc<HostCoordinator>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Runtime {
    /// Wire everything from `config` and spawn the background loops.
    ///
    /// Must be called from within a tokio runtime. Cancelling `cancel` stops
    /// every loop and disarms pending deadline timers.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn start(config: &AppConfig, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;

        let topic = Topic::new(SEARCH_TOPIC);
        let queue = Queue::new(RESPONSE_QUEUE);
        let tracker = TaskTracker::new();
        let registry = build_registry(&config.providers)?;

        for provider in registry.iter() {
            let router = InquiryRouter::new(Arc::clone(provider), queue.clone());
            tracker.spawn(router.run(topic.subscribe(), cancel.clone(), tracker.clone()));
        }
        tracker.spawn(log_completions(topic.subscribe(), cancel.clone()));

        let coordinator = Arc::new(SearchCoordinator::new(
            Arc::new(InMemorySearchStore::new()),
            topic,
            config.search.clone(),
            registry.ids(),
            cancel.clone(),
        )?);
        tracker.spawn(run_aggregator(
            Arc::clone(&coordinator),
            queue,
            cancel.clone(),
        ));

        tracing::info!(
            providers = ?registry.ids(),
            timeout_secs = config.search.timeout_seconds,
            "flightsearch runtime started"
        );
        Ok(Self {
            coordinator,
            cancel,
            tracker,
        })
    }

    pub fn coordinator(&self) -> Arc<HostCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// HTTP router backed by this runtime's coordinator.
    pub fn router(&self) -> axum::Router {
        crate::api::router(self.coordinator())
    }

    /// Serve HTTP on `listener` until the runtime is cancelled, then shut
    /// down.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Server`] if the server fails.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!("flightsearch listening on http://{local_addr}");

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(self.cancel.clone().cancelled_owned())
            .await
            .map_err(|e| AppError::Server(e.to_string()));

        self.shutdown().await;
        served
    }

    /// Cancel every loop and wait for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("flightsearch runtime stopped");
    }
}

/// Bind `config.server` and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if wiring fails, the port cannot be bound, or the server
/// fails.
pub async fn run(config: AppConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let runtime = Runtime::start(&config, cancel.clone())?;

    let listener = match TcpListener::bind(config.server.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            runtime.shutdown().await;
            return Err(AppError::Server(format!(
                "failed to bind {}: {e}",
                config.server.bind_addr()
            )));
        }
    };

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {e}");
            return;
        }
        tracing::info!("received Ctrl+C, shutting down...");
        cancel_clone.cancel();
    });

    runtime.serve(listener).await
}

/// Log every completed search until `cancel` fires.
async fn log_completions(mut subscription: Subscription, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            next = subscription.recv() => {
                let Some(envelope) = next else { break };
                if let Payload::SearchCompleted(done) = envelope.payload {
                    let cheapest = done.offers.first().map(|o| o.price);
                    tracing::info!(
                        search_id = %done.search_id,
                        offers = done.offers.len(),
                        errors = done.errors.len(),
                        cheapest = ?cheapest,
                        "search results ready"
                    );
                }
            }
        }
    }
}
