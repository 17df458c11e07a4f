//! Search coordinator: owns the aggregate lifecycle.
//!
//! # Lifecycle
//!
//! 1. [`SearchCoordinator::start_search`] stores a pending aggregate,
//!    broadcasts the request to every provider router and arms a one-shot
//!    deadline timer, then returns the new id without waiting on anything.
//! 2. The aggregator loop feeds each provider response into
//!    [`SearchCoordinator::process_provider_response`].
//! 3. The search ends either when every expected provider has answered
//!    (a completion notice is broadcast and the timer is disarmed) or when
//!    the timer fires first.
//!
//! The deadline timer runs as its own task, so it fires even after the
//! caller that started the search has gone away. It is cancelled only by
//! early completion or process shutdown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::aggregate::{AddOutcome, SearchAggregate};
use crate::bus::Topic;
use crate::config::CoordinatorConfig;
use crate::error::SearchError;
use crate::message::{ProviderSelector, SearchDispatch};
use crate::store::SearchStore;
use crate::types::{
    ProviderResponse, SearchCompleted, SearchId, SearchRequest, SearchStatusReport,
};

type DeadlineMap = Arc<Mutex<HashMap<SearchId, CancellationToken>>>;

/// Starts searches, gathers provider responses and enforces deadlines.
pub struct SearchCoordinator<S: SearchStore> {
    store: Arc<S>,
    topic: Topic,
    config: CoordinatorConfig,
    expected_providers: Vec<String>,
    deadlines: DeadlineMap,
    shutdown: CancellationToken,
}

impl<S: SearchStore> SearchCoordinator<S> {
    /// Create a coordinator expecting one response from each of
    /// `expected_providers` per search.
    ///
    /// Deadline timers are children of `shutdown`, so cancelling it disarms
    /// every pending timer.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `config` is invalid or no provider
    /// is expected.
    pub fn new(
        store: Arc<S>,
        topic: Topic,
        config: CoordinatorConfig,
        expected_providers: Vec<String>,
        shutdown: CancellationToken,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        if expected_providers.is_empty() {
            return Err(SearchError::Config(
                "at least one provider must be expected".into(),
            ));
        }
        Ok(Self {
            store,
            topic,
            config,
            expected_providers,
            deadlines: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        })
    }

    /// Start a new search and return its id immediately.
    ///
    /// Never waits on a provider or on the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Infrastructure`] if the aggregate cannot be
    /// stored. Nothing is broadcast in that case.
    pub async fn start_search(&self, request: SearchRequest) -> Result<SearchId, SearchError> {
        let search_id = SearchId::generate();
        let aggregate = SearchAggregate::new(
            search_id.clone(),
            request.clone(),
            self.expected_providers.iter().cloned(),
        );
        self.store.insert(aggregate).await?;

        // Armed first so a search completing during the broadcast can disarm it.
        self.arm_deadline(search_id.clone());
        let delivered = self.topic.publish(SearchDispatch {
            search_id: search_id.clone(),
            selector: ProviderSelector::All,
            request,
        });
        if delivered == 0 {
            tracing::warn!(%search_id, "search broadcast reached no routers");
        }

        tracing::info!(
            %search_id,
            routers = delivered,
            deadline_secs = self.config.timeout_seconds,
            "search started"
        );
        Ok(search_id)
    }

    /// Report the current state of a search.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::NotFound`] if the id was never started.
    pub async fn get_status(&self, search_id: &SearchId) -> Result<SearchStatusReport, SearchError> {
        let aggregate = self
            .store
            .get(search_id)
            .await?
            .ok_or_else(|| SearchError::NotFound(search_id.to_string()))?;
        Ok(aggregate.status_report())
    }

    /// Record one provider response.
    ///
    /// Responses for unknown searches are dropped and yield `Ok(None)`.
    /// Otherwise returns what the aggregate did with the result. When this
    /// call completes the search, a [`SearchCompleted`] notice is broadcast
    /// and the deadline timer is disarmed.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn process_provider_response(
        &self,
        response: ProviderResponse,
    ) -> Result<Option<AddOutcome>, SearchError> {
        let ProviderResponse {
            search_id,
            provider_id,
            offers,
            success,
            error,
        } = response;
        let offer_count = offers.len();

        let applied = self
            .store
            .update(&search_id, |aggregate| {
                let outcome = aggregate.add_result(&provider_id, offers, success, error);
                let completed = (outcome == AddOutcome::Completed).then(|| SearchCompleted {
                    search_id: aggregate.search_id().clone(),
                    offers: aggregate.all_offers(),
                    errors: aggregate.errors().to_vec(),
                });
                (outcome, completed, aggregate.progress())
            })
            .await?;

        let Some((outcome, completed, progress)) = applied else {
            tracing::debug!(%search_id, provider = %provider_id, "response for unknown search dropped");
            return Ok(None);
        };

        match outcome {
            AddOutcome::Recorded | AddOutcome::Completed => tracing::info!(
                %search_id,
                provider = %provider_id,
                success,
                offers = offer_count,
                progress,
                "provider response recorded"
            ),
            AddOutcome::Duplicate => tracing::warn!(
                %search_id,
                provider = %provider_id,
                "duplicate provider response ignored"
            ),
            AddOutcome::UnexpectedProvider => tracing::warn!(
                %search_id,
                provider = %provider_id,
                "response from unexpected provider ignored"
            ),
            AddOutcome::NotPending => tracing::debug!(
                %search_id,
                provider = %provider_id,
                "late response for finished search ignored"
            ),
        }

        if let Some(completed) = completed {
            self.disarm_deadline(&search_id);
            let offers = completed.offers.len();
            self.topic.publish(completed);
            tracing::info!(%search_id, offers, "search completed");
        }
        Ok(Some(outcome))
    }

    /// Provider ids every search waits for.
    pub fn expected_providers(&self) -> &[String] {
        &self.expected_providers
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Number of deadline timers that have neither fired nor been disarmed.
    pub fn armed_deadlines(&self) -> usize {
        lock_deadlines(&self.deadlines).len()
    }

    fn arm_deadline(&self, search_id: SearchId) {
        let token = self.shutdown.child_token();
        lock_deadlines(&self.deadlines).insert(search_id.clone(), token.clone());

        let store = Arc::clone(&self.store);
        let deadlines = Arc::clone(&self.deadlines);
        let deadline = self.config.deadline();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    tracing::debug!(%search_id, "deadline timer disarmed");
                }
                () = tokio::time::sleep(deadline) => {
                    expire_search(store.as_ref(), &search_id).await;
                }
            }
            lock_deadlines(&deadlines).remove(&search_id);
        });
    }

    fn disarm_deadline(&self, search_id: &SearchId) {
        if let Some(token) = lock_deadlines(&self.deadlines).remove(search_id) {
            token.cancel();
        }
    }
}

/// Deadline handler: time the search out if it is still pending.
async fn expire_search<S: SearchStore>(store: &S, search_id: &SearchId) {
    match store.update(search_id, SearchAggregate::timeout).await {
        Ok(Some(true)) => tracing::info!(%search_id, "search timed out"),
        Ok(Some(false)) => tracing::debug!(%search_id, "deadline fired after search finished"),
        Ok(None) => tracing::warn!(%search_id, "deadline fired for unknown search"),
        Err(e) => tracing::error!(%search_id, error = %e, "failed to time out search"),
    }
}

fn lock_deadlines(
    deadlines: &Mutex<HashMap<SearchId, CancellationToken>>,
) -> MutexGuard<'_, HashMap<SearchId, CancellationToken>> {
    deadlines.lock().unwrap_or_else(|e| e.into_inner())
}
