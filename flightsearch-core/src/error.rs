//! Error types for the flightsearch-core crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. Only [`SearchError::Validation`] and
//! [`SearchError::NotFound`] are ever surfaced to a caller synchronously;
//! everything arising after dispatch ends up in a search's error list.

/// Errors that can occur while coordinating a scatter-gather search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The incoming search request is malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// A status query named a search id that was never started.
    #[error("search not found: {0}")]
    NotFound(String),

    /// A provider reported a failure for its part of a search.
    #[error("provider failure: {0}")]
    Provider(String),

    /// An unexpected fault inside a router, the aggregator or the store.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// Invalid coordinator configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A topic or queue could not accept a message.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience type alias for flightsearch-core results.
pub type Result<T> = std::result::Result<T, SearchError>;
