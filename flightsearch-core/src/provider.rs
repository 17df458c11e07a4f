//! Provider capability trait and the explicit provider registry.
//!
//! A provider is anything that, given a [`ProviderRequest`], eventually
//! returns offers or a failure. The coordinator never assumes a latency
//! bound tighter than its own deadline.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SearchError;
use crate::types::{ProviderReply, ProviderRequest};

/// A pluggable flight provider backend.
///
/// Implementations report business failures (provider down, no
/// availability) as an `Ok` reply with `success == false`. An `Err` means
/// the call itself broke; the router turns it into a failure response.
///
/// All implementations must be `Send + Sync` so one instance can serve
/// concurrent requests.
#[async_trait]
pub trait FlightProvider: Send + Sync {
    /// Stable provider id, used as the routing key and in error messages.
    fn id(&self) -> &str;

    /// Search for offers matching `request`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the provider could not be consulted at all.
    async fn search(&self, request: &ProviderRequest) -> Result<ProviderReply, SearchError>;
}

/// Ordered, explicit mapping of provider id to capability, built at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn FlightProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the id is blank or already taken.
    pub fn register(&mut self, provider: Arc<dyn FlightProvider>) -> Result<(), SearchError> {
        let id = provider.id();
        if id.trim().is_empty() {
            return Err(SearchError::Config("provider id must not be empty".into()));
        }
        if self.get(id).is_some() {
            return Err(SearchError::Config(format!(
                "provider {id} registered twice"
            )));
        }
        self.providers.push(provider);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn with(mut self, provider: Arc<dyn FlightProvider>) -> Result<Self, SearchError> {
        self.register(provider)?;
        Ok(self)
    }

    /// Look up a provider by id.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn FlightProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_owned()).collect()
    }

    /// Iterate over registered providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FlightProvider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
