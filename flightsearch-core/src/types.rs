//! Core types shared by the coordinator, the routers and the front end.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Smallest accepted passenger count.
pub const MIN_PASSENGERS: u8 = 1;
/// Largest accepted passenger count.
pub const MAX_PASSENGERS: u8 = 9;

/// Unique identifier of one scatter-gather search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchId(String);

impl SearchId {
    /// Allocate a fresh, random search id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SearchId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for SearchId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable input describing what the caller is looking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Origin airport code.
    pub origin: String,
    /// Destination airport code.
    pub destination: String,
    /// Day of departure.
    pub departure_date: NaiveDate,
    /// Number of travelling passengers.
    pub passengers: u8,
    /// Requested cabin, e.g. `economy`.
    pub cabin_class: String,
}

impl SearchRequest {
    /// Reject requests that must never reach the coordinator.
    ///
    /// Checks:
    /// - `origin` and `destination` must not be blank
    /// - `departure_date` must not be before `today`
    /// - `passengers` must be within [`MIN_PASSENGERS`]..=[`MAX_PASSENGERS`]
    pub fn validate(&self, today: NaiveDate) -> Result<(), SearchError> {
        if self.origin.trim().is_empty() || self.destination.trim().is_empty() {
            return Err(SearchError::Validation(
                "origin and destination are required".into(),
            ));
        }
        if self.departure_date < today {
            return Err(SearchError::Validation(
                "departure date cannot be in the past".into(),
            ));
        }
        if !(MIN_PASSENGERS..=MAX_PASSENGERS).contains(&self.passengers) {
            return Err(SearchError::Validation(format!(
                "passengers must be between {MIN_PASSENGERS} and {MAX_PASSENGERS}"
            )));
        }
        Ok(())
    }
}

/// A single bookable flight returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightOffer {
    /// Provider that produced this offer.
    pub provider: String,
    pub flight_number: String,
    pub airline: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub origin: String,
    pub destination: String,
    /// Total price in `currency`.
    pub price: f64,
    pub currency: String,
    pub duration_minutes: u32,
    pub stops: u8,
}

/// Provider-specific sub-request built by a router from a broadcast request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest {
    pub search_id: SearchId,
    pub provider_id: String,
    pub request: SearchRequest,
}

/// What a provider capability hands back for one sub-request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub provider_id: String,
    pub offers: Vec<FlightOffer>,
    pub success: bool,
    pub error: Option<String>,
    /// Wall time the provider spent on the call.
    pub elapsed: std::time::Duration,
}

impl ProviderReply {
    /// Successful reply carrying `offers`.
    pub fn success(
        provider_id: impl Into<String>,
        offers: Vec<FlightOffer>,
        elapsed: std::time::Duration,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            offers,
            success: true,
            error: None,
            elapsed,
        }
    }

    /// Failed reply with no offers.
    pub fn failure(
        provider_id: impl Into<String>,
        error: impl Into<String>,
        elapsed: std::time::Duration,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            offers: Vec::new(),
            success: false,
            error: Some(error.into()),
            elapsed,
        }
    }
}

/// The single response a router emits onto the queue for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    pub search_id: SearchId,
    pub provider_id: String,
    pub offers: Vec<FlightOffer>,
    pub success: bool,
    pub error: Option<String>,
}

impl ProviderResponse {
    /// Synthetic failure used when the provider could not be consulted.
    pub fn failure(
        search_id: SearchId,
        provider_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            search_id,
            provider_id: provider_id.into(),
            offers: Vec::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Broadcast once when a search gathers every expected response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCompleted {
    pub search_id: SearchId,
    pub offers: Vec<FlightOffer>,
    pub errors: Vec<String>,
}

/// Lifecycle state of a search aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    /// Waiting for provider responses.
    Pending,
    /// Every expected provider responded.
    Completed,
    /// The deadline elapsed first.
    Timeout,
}

impl SearchStatus {
    /// Lower-cased wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Timeout => "timeout",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider's recorded contribution to a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub provider_id: String,
    pub offers: Vec<FlightOffer>,
    pub success: bool,
    pub error: Option<String>,
}

/// Snapshot returned by a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStatusReport {
    pub search_id: SearchId,
    pub status: SearchStatus,
    /// Offers from successful providers, cheapest first.
    pub offers: Vec<FlightOffer>,
    pub errors: Vec<String>,
    /// Percentage of expected providers that have responded.
    pub progress: u8,
}
