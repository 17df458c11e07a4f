//! # flightsearch-core
//!
//! Scatter-gather coordination for flight searches.
//!
//! One search request is broadcast on a [`Topic`] to every provider router.
//! Each [`InquiryRouter`] consults its provider and answers exactly once on
//! a fan-in [`Queue`]. The aggregator loop feeds those answers to the
//! [`SearchCoordinator`], which folds them into a [`SearchAggregate`] until
//! every expected provider has answered or the per-search deadline fires.
//!
//! ## Design
//!
//! - Components talk only through the topic, the queue and the
//!   [`SearchStore`]; none calls another directly
//! - Topic and queue are unbounded, so publishers never block
//! - Updates to one search are serialised by the store
//! - Completion is tracked by provider identity: a second answer from the
//!   same provider is ignored
//! - Every long-running loop stops on a shared `CancellationToken`
//!
//! ## Example
//!
//! ```no_run
//! # async fn example(
//! #     registry: flightsearch_core::ProviderRegistry,
//! #     request: flightsearch_core::SearchRequest,
//! # ) -> flightsearch_core::Result<()> {
//! use std::sync::Arc;
//! use flightsearch_core::{
//!     run_aggregator, CoordinatorConfig, InMemorySearchStore, InquiryRouter, Queue,
//!     SearchCoordinator, Topic,
//! };
//! use tokio_util::sync::CancellationToken;
//! use tokio_util::task::TaskTracker;
//!
//! let topic = Topic::new("searches");
//! let queue = Queue::new("responses");
//! let cancel = CancellationToken::new();
//! let tracker = TaskTracker::new();
//!
//! for provider in registry.iter() {
//!     let router = InquiryRouter::new(Arc::clone(provider), queue.clone());
//!     tracker.spawn(router.run(topic.subscribe(), cancel.clone(), tracker.clone()));
//! }
//!
//! let coordinator = Arc::new(SearchCoordinator::new(
//!     Arc::new(InMemorySearchStore::new()),
//!     topic,
//!     CoordinatorConfig::default(),
//!     registry.ids(),
//!     cancel.clone(),
//! )?);
//! tracker.spawn(run_aggregator(Arc::clone(&coordinator), queue, cancel.clone()));
//!
//! let search_id = coordinator.start_search(request).await?;
//! let report = coordinator.get_status(&search_id).await?;
//! println!("{} is {}", report.search_id, report.status);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod aggregator;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod provider;
pub mod router;
pub mod store;
pub mod types;

pub use aggregate::{AddOutcome, SearchAggregate};
pub use aggregator::run_aggregator;
pub use bus::{Queue, Subscription, Topic};
pub use config::CoordinatorConfig;
pub use coordinator::SearchCoordinator;
pub use error::{Result, SearchError};
pub use message::{Envelope, Payload, ProviderSelector, SearchDispatch, ALL_PROVIDERS};
pub use provider::{FlightProvider, ProviderRegistry};
pub use router::InquiryRouter;
pub use store::{InMemorySearchStore, SearchStore};
pub use types::{
    FlightOffer, ProviderReply, ProviderRequest, ProviderResponse, ProviderResult,
    SearchCompleted, SearchId, SearchRequest, SearchStatus, SearchStatusReport, MAX_PASSENGERS,
    MIN_PASSENGERS,
};
