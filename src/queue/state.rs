//! Dispatch state: pending/in-flight bookkeeping over an identifier store.
//!
//! All methods are plain state transitions with no locking; the owning
//! [`DeletionQueue`](super::DeletionQueue) serializes access.

use std::collections::HashSet;

use crate::asset::AssetId;
use crate::store::{IdentifierStore, StoreError};

/// How an executor finished with an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Deleted,
    Failed,
}

/// One pending identifier as seen by status queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub asset: AssetId,
    pub in_flight: bool,
}

/// Pending set (owned by the store) plus the in-flight set (owned here).
///
/// The in-flight set is never persisted. After a restart it is empty and
/// every pending identifier becomes eligible again.
#[derive(Debug)]
pub struct DispatchState<S> {
    store: S,
    in_flight: HashSet<AssetId>,
}

impl<S: IdentifierStore> DispatchState<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            in_flight: HashSet::new(),
        }
    }

    /// Add an identifier to the pending set. Duplicates collapse.
    pub fn enqueue(&mut self, id: &AssetId) -> Result<(), StoreError> {
        self.store.insert(id)
    }

    /// Hand out the first eligible identifier and mark it in flight.
    ///
    /// Eligible = pending − in-flight, recomputed from the store on every
    /// call (linear in the pending set).
    pub fn request_next(&mut self) -> Result<Option<AssetId>, StoreError> {
        let pending = self.store.read()?;
        let next = pending.into_iter().find(|id| !self.in_flight.contains(id));
        if let Some(id) = &next {
            self.in_flight.insert(id.clone());
        }
        Ok(next)
    }

    /// Drop an identifier from both sets.
    ///
    /// The store is updated first; if that fails the identifier stays
    /// pending and in flight, so the two sets never disagree.
    pub fn resolve(&mut self, id: &AssetId, _outcome: Outcome) -> Result<(), StoreError> {
        self.store.remove(id)?;
        self.in_flight.remove(id);
        Ok(())
    }

    /// Clear the in-flight marker only, making the identifier eligible again.
    ///
    /// Returns `true` if the identifier was in flight.
    pub fn release(&mut self, id: &AssetId) -> bool {
        self.in_flight.remove(id)
    }

    pub fn is_in_flight(&self, id: &AssetId) -> bool {
        self.in_flight.contains(id)
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Pending identifiers in store order, flagged if in flight.
    pub fn snapshot(&self) -> Result<Vec<PendingEntry>, StoreError> {
        Ok(self
            .store
            .read()?
            .into_iter()
            .map(|asset| PendingEntry {
                in_flight: self.in_flight.contains(&asset),
                asset,
            })
            .collect())
    }
}
