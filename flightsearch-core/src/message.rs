//! Message envelope and payloads carried by the topic and the queue.
//!
//! Every message crossing a [`crate::bus::Topic`] or [`crate::bus::Queue`] is
//! wrapped in an [`Envelope`]. Payloads are a closed tagged union, so
//! consumers match exhaustively instead of probing message types at runtime.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ProviderResponse, SearchCompleted, SearchId, SearchRequest};

/// Wire form of the selector that addresses every provider.
pub const ALL_PROVIDERS: &str = "ALL";

/// Routing key on a broadcast request naming which provider(s) should act.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderSelector {
    /// Every router acts on the request.
    All,
    /// Only the router for this provider id acts on the request.
    Provider(String),
}

impl ProviderSelector {
    /// Whether a router for `provider_id` should act on the request.
    pub fn matches(&self, provider_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Provider(id) => id == provider_id,
        }
    }
}

impl From<String> for ProviderSelector {
    fn from(raw: String) -> Self {
        if raw == ALL_PROVIDERS {
            Self::All
        } else {
            Self::Provider(raw)
        }
    }
}

impl From<ProviderSelector> for String {
    fn from(selector: ProviderSelector) -> Self {
        match selector {
            ProviderSelector::All => ALL_PROVIDERS.to_owned(),
            ProviderSelector::Provider(id) => id,
        }
    }
}

impl fmt::Display for ProviderSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ALL_PROVIDERS),
            Self::Provider(id) => f.write_str(id),
        }
    }
}

/// Broadcast asking the selected providers to search on behalf of a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDispatch {
    pub search_id: SearchId,
    pub selector: ProviderSelector,
    pub request: SearchRequest,
}

/// Everything that may travel over the topic or the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Scatter: a search was started and providers should be consulted.
    SearchRequested(SearchDispatch),
    /// Gather: one provider's answer for one search.
    ProviderResponded(ProviderResponse),
    /// A search gathered every expected response.
    SearchCompleted(SearchCompleted),
}

impl Payload {
    /// Stable payload type tag recorded on the envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SearchRequested(_) => "search_requested",
            Self::ProviderResponded(_) => "provider_responded",
            Self::SearchCompleted(_) => "search_completed",
        }
    }

    /// Search this payload belongs to.
    pub fn search_id(&self) -> &SearchId {
        match self {
            Self::SearchRequested(dispatch) => &dispatch.search_id,
            Self::ProviderResponded(response) => &response.search_id,
            Self::SearchCompleted(completed) => &completed.search_id,
        }
    }
}

impl From<SearchDispatch> for Payload {
    fn from(dispatch: SearchDispatch) -> Self {
        Self::SearchRequested(dispatch)
    }
}

impl From<ProviderResponse> for Payload {
    fn from(response: ProviderResponse) -> Self {
        Self::ProviderResponded(response)
    }
}

impl From<SearchCompleted> for Payload {
    fn from(completed: SearchCompleted) -> Self {
        Self::SearchCompleted(completed)
    }
}

/// Metadata wrapper around every published payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique message id.
    pub id: String,
    /// Payload type tag, see [`Payload::kind`].
    pub kind: String,
    /// When the message was wrapped.
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
}

impl Envelope {
    /// Wrap `payload` with a fresh id and the current time.
    pub fn new(payload: impl Into<Payload>) -> Self {
        let payload = payload.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: payload.kind().to_owned(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dispatch(selector: ProviderSelector) -> SearchDispatch {
        SearchDispatch {
            search_id: SearchId::from("s-1"),
            selector,
            request: SearchRequest {
                origin: "JFK".into(),
                destination: "LAX".into(),
                departure_date: NaiveDate::from_ymd_opt(2030, 5, 1).expect("valid date"),
                passengers: 1,
                cabin_class: "economy".into(),
            },
        }
    }

    #[test]
    fn all_selector_matches_every_provider() {
        assert!(ProviderSelector::All.matches("Amadeus"));
        assert!(ProviderSelector::All.matches("Skyscanner"));
    }

    #[test]
    fn named_selector_matches_only_that_provider() {
        let selector = ProviderSelector::Provider("Amadeus".into());
        assert!(selector.matches("Amadeus"));
        assert!(!selector.matches("Skyscanner"));
    }

    #[test]
    fn selector_wire_form() {
        assert_eq!(ProviderSelector::from("ALL".to_string()), ProviderSelector::All);
        assert_eq!(String::from(ProviderSelector::All), "ALL");
        assert_eq!(
            serde_json::to_string(&ProviderSelector::Provider("Amadeus".into()))
                .expect("serialize"),
            "\"Amadeus\""
        );
    }

    #[test]
    fn envelope_records_payload_kind() {
        let envelope = Envelope::new(dispatch(ProviderSelector::All));
        assert_eq!(envelope.kind, "search_requested");
        assert_eq!(envelope.payload.search_id().as_str(), "s-1");
        assert!(!envelope.id.is_empty());
    }

    #[test]
    fn envelope_ids_are_unique() {
        let a = Envelope::new(dispatch(ProviderSelector::All));
        let b = Envelope::new(dispatch(ProviderSelector::All));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn payload_is_tagged_on_the_wire() {
        let payload = Payload::from(dispatch(ProviderSelector::All));
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["type"], "search_requested");
        assert_eq!(json["data"]["selector"], "ALL");
    }
}
