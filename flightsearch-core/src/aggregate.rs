//! The search aggregate and its state machine.
//!
//! One [`SearchAggregate`] exists per search id for the lifetime of the
//! process. It starts `Pending` and moves exactly once into a terminal state.
//!
//! # State Machine
//!
//! ```text
//!              every expected provider recorded
//! ┌─────────┐ ─────────────────────────────────► ┌───────────┐
//! │ Pending │                                     │ Completed │
//! └────┬────┘                                     └───────────┘
//!      │ deadline elapsed
//!      ▼
//! ┌─────────┐
//! │ Timeout │
//! └─────────┘
//! ```
//!
//! Results are recorded at most once per provider id. A second result from a
//! provider that already answered is rejected, so a duplicated response can
//! never complete a search on behalf of a provider that has not answered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    FlightOffer, ProviderResult, SearchId, SearchRequest, SearchStatus, SearchStatusReport,
};

/// What happened when a provider result was offered to an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Result appended; the search is still waiting on other providers.
    Recorded,
    /// Result appended and it was the last one missing: the search just completed.
    Completed,
    /// The provider already has a recorded result; nothing changed.
    Duplicate,
    /// The provider is not one the search is waiting for; nothing changed.
    UnexpectedProvider,
    /// The search already reached a terminal state; nothing changed.
    NotPending,
}

impl AddOutcome {
    /// Whether the aggregate was mutated.
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded | Self::Completed)
    }
}

/// The single mutable record representing one in-flight or finished search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAggregate {
    search_id: SearchId,
    request: SearchRequest,
    status: SearchStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    results: Vec<ProviderResult>,
    errors: Vec<String>,
    expected_providers: Vec<String>,
}

impl SearchAggregate {
    /// Create a pending aggregate waiting on `expected_providers`.
    ///
    /// Duplicate provider ids are collapsed, keeping first-seen order.
    pub fn new<I, P>(search_id: SearchId, request: SearchRequest, expected_providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut expected: Vec<String> = Vec::new();
        for provider in expected_providers {
            let provider = provider.into();
            if !expected.contains(&provider) {
                expected.push(provider);
            }
        }
        Self {
            search_id,
            request,
            status: SearchStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            results: Vec::new(),
            errors: Vec::new(),
            expected_providers: expected,
        }
    }

    /// Record one provider's result.
    ///
    /// Ignored unless the search is pending, the provider is expected and it
    /// has not answered yet. A failed result carrying a non-empty message
    /// also appends `"<provider_id>: <error>"` to the error list. When the last expected
    /// provider is recorded the search transitions to
    /// [`SearchStatus::Completed`] and the completion time is stamped.
    pub fn add_result(
        &mut self,
        provider_id: &str,
        offers: Vec<FlightOffer>,
        success: bool,
        error: Option<String>,
    ) -> AddOutcome {
        if self.status != SearchStatus::Pending {
            return AddOutcome::NotPending;
        }
        if !self.expected_providers.iter().any(|p| p == provider_id) {
            return AddOutcome::UnexpectedProvider;
        }
        if self.has_result_from(provider_id) {
            return AddOutcome::Duplicate;
        }

        if let Some(message) = error.as_deref().filter(|e| !success && !e.is_empty()) {
            self.errors.push(format!("{provider_id}: {message}"));
        }
        self.results.push(ProviderResult {
            provider_id: provider_id.to_owned(),
            offers,
            success,
            error,
        });

        if self.results.len() >= self.expected_providers.len() {
            self.status = SearchStatus::Completed;
            self.completed_at = Some(Utc::now());
            AddOutcome::Completed
        } else {
            AddOutcome::Recorded
        }
    }

    /// Force a pending search into [`SearchStatus::Timeout`].
    ///
    /// Returns `true` if this call performed the transition, `false` if the
    /// search was already terminal.
    pub fn timeout(&mut self) -> bool {
        if self.status != SearchStatus::Pending {
            return false;
        }
        self.status = SearchStatus::Timeout;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Offers from successful results only, sorted by price ascending.
    ///
    /// The sort is stable, so equally priced offers keep arrival order.
    pub fn all_offers(&self) -> Vec<FlightOffer> {
        let mut offers: Vec<FlightOffer> = self
            .results
            .iter()
            .filter(|r| r.success)
            .flat_map(|r| r.offers.iter().cloned())
            .collect();
        offers.sort_by(|a, b| a.price.total_cmp(&b.price));
        offers
    }

    /// `floor(results * 100 / expected)`, or 0 when nothing is expected.
    pub fn progress(&self) -> u8 {
        let expected = self.expected_providers.len();
        if expected == 0 {
            return 0;
        }
        let pct = self.results.len() * 100 / expected;
        u8::try_from(pct.min(100)).unwrap_or(100)
    }

    /// Build the caller-facing status snapshot.
    pub fn status_report(&self) -> SearchStatusReport {
        SearchStatusReport {
            search_id: self.search_id.clone(),
            status: self.status,
            offers: self.all_offers(),
            errors: self.errors.clone(),
            progress: self.progress(),
        }
    }

    pub fn search_id(&self) -> &SearchId {
        &self.search_id
    }

    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn results(&self) -> &[ProviderResult] {
        &self.results
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn expected_providers(&self) -> &[String] {
        &self.expected_providers
    }

    /// Whether `provider_id` already has a recorded result.
    pub fn has_result_from(&self, provider_id: &str) -> bool {
        self.results.iter().any(|r| r.provider_id == provider_id)
    }
}
