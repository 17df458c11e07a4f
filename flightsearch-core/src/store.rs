//! Keyed storage for search aggregates.
//!
//! [`SearchStore`] is the seam between the coordinator and wherever
//! aggregates live. Mutation goes through [`SearchStore::update`], which must
//! apply the closure atomically with respect to every other update of the
//! same search id, so two responses for one search can never both start from
//! a stale copy.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

use crate::aggregate::SearchAggregate;
use crate::error::SearchError;
use crate::types::SearchId;

/// Keyed lookup and serialised update of search aggregates.
///
/// Implementations must guarantee that:
///
/// - [`insert`](Self::insert) stores at most one aggregate per id
/// - [`update`](Self::update) closures for the same id never interleave
/// - [`get`](Self::get) returns either the state before or after an update,
///   never a partial one
pub trait SearchStore: Send + Sync + 'static {
    /// Persist a freshly created aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Infrastructure`] if an aggregate with the same
    /// id already exists.
    fn insert(
        &self,
        aggregate: SearchAggregate,
    ) -> impl Future<Output = Result<(), SearchError>> + Send;

    /// Fetch a consistent snapshot of an aggregate.
    fn get(
        &self,
        search_id: &SearchId,
    ) -> impl Future<Output = Result<Option<SearchAggregate>, SearchError>> + Send;

    /// Apply `mutate` to the stored aggregate and persist the result.
    ///
    /// Returns `Ok(None)` if no aggregate exists for `search_id`.
    fn update<F, R>(
        &self,
        search_id: &SearchId,
        mutate: F,
    ) -> impl Future<Output = Result<Option<R>, SearchError>> + Send
    where
        F: FnOnce(&mut SearchAggregate) -> R + Send,
        R: Send;

    /// Number of stored aggregates.
    fn len(&self) -> impl Future<Output = Result<usize, SearchError>> + Send;
}

type Slot = Arc<Mutex<SearchAggregate>>;

/// Process-lifetime, in-memory [`SearchStore`].
///
/// Each aggregate sits behind its own mutex, so updates to one search
/// serialise while different searches proceed independently. The outer map
/// lock is only held long enough to look a slot up or add one.
#[derive(Default)]
pub struct InMemorySearchStore {
    slots: RwLock<HashMap<SearchId, Slot>>,
}

impl InMemorySearchStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, search_id: &SearchId) -> Option<Slot> {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(search_id)
            .cloned()
    }
}

impl SearchStore for InMemorySearchStore {
    async fn insert(&self, aggregate: SearchAggregate) -> Result<(), SearchError> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        let search_id = aggregate.search_id().clone();
        if slots.contains_key(&search_id) {
            return Err(SearchError::Infrastructure(format!(
                "search {search_id} already exists"
            )));
        }
        slots.insert(search_id, Arc::new(Mutex::new(aggregate)));
        Ok(())
    }

    async fn get(&self, search_id: &SearchId) -> Result<Option<SearchAggregate>, SearchError> {
        Ok(self
            .slot(search_id)
            .map(|slot| slot.lock().unwrap_or_else(|e| e.into_inner()).clone()))
    }

    async fn update<F, R>(&self, search_id: &SearchId, mutate: F) -> Result<Option<R>, SearchError>
    where
        F: FnOnce(&mut SearchAggregate) -> R + Send,
        R: Send,
    {
        let Some(slot) = self.slot(search_id) else {
            return Ok(None);
        };
        let mut aggregate = slot.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Some(mutate(&mut aggregate)))
    }

    async fn len(&self) -> Result<usize, SearchError> {
        Ok(self.slots.read().unwrap_or_else(|e| e.into_inner()).len())
    }
}
