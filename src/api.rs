//! HTTP front end for the search coordinator.
//!
//! `POST /search` validates the body and returns `202 Accepted` with the new
//! search id straight away; results are polled from `GET /status/{id}`.
//! Nothing that happens after dispatch is ever reported as a request failure.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use flightsearch_core::{
    FlightOffer, SearchCoordinator, SearchError, SearchId, SearchRequest, SearchStatus,
    SearchStatusReport, SearchStore, MAX_PASSENGERS, MIN_PASSENGERS,
};
use serde::{Deserialize, Serialize};

const DEFAULT_CABIN_CLASS: &str = "economy";

struct ApiState<S: SearchStore> {
    coordinator: Arc<SearchCoordinator<S>>,
}

impl<S: SearchStore> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

/// Body of `POST /search`, also served by `GET /sample`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBody {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    /// `YYYY-MM-DD`; a full timestamp is accepted and truncated to its date.
    pub departure_date: String,
    pub passengers: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cabin_class: Option<String>,
}

impl SearchBody {
    /// Convert and validate against `today`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Validation`] describing the first problem.
    pub fn into_request(self, today: NaiveDate) -> Result<SearchRequest, SearchError> {
        let departure_date = parse_departure_date(&self.departure_date)?;
        let passengers = u8::try_from(self.passengers).map_err(|_| {
            SearchError::Validation(format!(
                "passengers must be between {MIN_PASSENGERS} and {MAX_PASSENGERS}"
            ))
        })?;
        let cabin_class = self
            .cabin_class
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CABIN_CLASS.to_owned());

        let request = SearchRequest {
            origin: self.origin.trim().to_owned(),
            destination: self.destination.trim().to_owned(),
            departure_date,
            passengers,
            cabin_class,
        };
        request.validate(today)?;
        Ok(request)
    }
}

fn parse_departure_date(raw: &str) -> Result<NaiveDate, SearchError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .map_err(|_| {
            SearchError::Validation(format!(
                "departureDate must be a date in YYYY-MM-DD form, got {raw:?}"
            ))
        })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchAccepted {
    search_id: SearchId,
    status: &'static str,
    status_url: String,
}

/// Body of `GET /status/{searchId}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub search_id: SearchId,
    pub status: SearchStatus,
    pub results: Vec<FlightOffer>,
    pub errors: Vec<String>,
    pub progress: u8,
}

impl From<SearchStatusReport> for StatusBody {
    fn from(report: SearchStatusReport) -> Self {
        Self {
            search_id: report.search_id,
            status: report.status,
            results: report.offers,
            errors: report.errors,
            progress: report.progress,
        }
    }
}

/// Maps core errors onto HTTP responses.
///
/// Validation and not-found errors are shown to the caller; anything else is
/// logged and answered with a generic 500.
pub struct ApiError(SearchError);

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(SearchError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            SearchError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            SearchError::NotFound(id) => (StatusCode::NOT_FOUND, format!("search {id} not found")),
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "an error occurred while processing your request".to_owned(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Build the HTTP router backed by `coordinator`.
pub fn router<S: SearchStore>(coordinator: Arc<SearchCoordinator<S>>) -> Router {
    Router::new()
        .route("/search", post(start_search::<S>))
        .route("/status/{search_id}", get(search_status::<S>))
        .route("/info", get(info::<S>))
        .route("/sample", get(sample))
        .route("/health", get(health))
        .with_state(ApiState { coordinator })
}

async fn start_search<S: SearchStore>(
    State(state): State<ApiState<S>>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let request = body.into_request(Utc::now().date_naive()).inspect_err(|e| {
        tracing::info!(error = %e, "search request rejected");
    })?;

    let route = format!("{}->{}", request.origin, request.destination);
    let search_id = state.coordinator.start_search(request).await?;
    tracing::info!(%search_id, %route, "search initiated");

    Ok((
        StatusCode::ACCEPTED,
        Json(SearchAccepted {
            status_url: format!("/status/{search_id}"),
            search_id,
            status: "initiated",
        }),
    ))
}

async fn search_status<S: SearchStore>(
    State(state): State<ApiState<S>>,
    Path(search_id): Path<String>,
) -> Result<Json<StatusBody>, ApiError> {
    let report = state
        .coordinator
        .get_status(&SearchId::from(search_id))
        .await?;
    Ok(Json(report.into()))
}

async fn info<S: SearchStore>(State(state): State<ApiState<S>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "pattern": "Scatter-Gather",
        "description": "One request is broadcast to every flight provider; their answers are gathered into a single search result",
        "flow": [
            "1. POST /search stores a pending search and broadcasts it on the search topic",
            "2. One inquiry router per provider consults its provider and answers on the response queue",
            "3. The aggregator folds each answer into the search until every provider has answered",
            "4. The search completes, or times out when its deadline passes first"
        ],
        "providers": state.coordinator.expected_providers(),
        "timeoutSeconds": state.coordinator.config().timeout_seconds,
    }))
}

async fn sample() -> Json<SearchBody> {
    let departure = Utc::now().date_naive() + TimeDelta::days(7);
    Json(SearchBody {
        origin: "JFK".to_owned(),
        destination: "LAX".to_owned(),
        departure_date: departure.format("%Y-%m-%d").to_string(),
        passengers: 2,
        cabin_class: Some(DEFAULT_CABIN_CLASS.to_owned()),
    })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}
