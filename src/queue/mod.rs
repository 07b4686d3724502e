//! Deletion dispatch queue: single-flight handout of pending asset deletions.
//!
//! [`DeletionQueue`] is a cloneable handle. Every clone shares one
//! mutex-guarded [`DispatchState`], so enqueue, request-next and outcome
//! reports from any number of threads are linearized. None of the
//! operations wait for work: an empty queue answers `None` immediately and
//! callers wait on [`DeletionQueue::wake`] before asking again.

mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use state::{DispatchState, Outcome, PendingEntry};

use crate::asset::AssetId;
use crate::store::{IdentifierStore, StoreError};
use crate::trigger::WakeSignal;

/// Shared handle to the dispatch queue.
///
/// Constructed once by the owning subsystem and cloned into producers and
/// consumers. There is no process-wide instance.
pub struct DeletionQueue<S> {
    state: Arc<Mutex<DispatchState<S>>>,
    wake: WakeSignal,
}

impl<S> Clone for DeletionQueue<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            wake: self.wake.clone(),
        }
    }
}

impl<S: IdentifierStore> DeletionQueue<S> {
    pub fn new(store: S) -> Self {
        Self {
            state: Arc::new(Mutex::new(DispatchState::new(store))),
            wake: WakeSignal::new(),
        }
    }

    /// Signal fired whenever new work may be eligible.
    pub fn wake(&self) -> &WakeSignal {
        &self.wake
    }

    /// Record that `asset` must be deleted and wake consumers.
    ///
    /// Safe to repeat; duplicates collapse.
    pub fn enqueue(&self, asset: AssetId) -> Result<(), StoreError> {
        self.lock().enqueue(&asset)?;
        tracing::debug!(asset = %asset, "added asset identifier to deletion queue");
        self.wake.signal_work_available();
        Ok(())
    }

    /// Take one eligible identifier, marking it in flight.
    ///
    /// Order among eligible identifiers is unspecified.
    pub fn request_next(&self) -> Result<Option<AssetId>, StoreError> {
        let next = self.lock().request_next()?;
        if let Some(asset) = &next {
            tracing::trace!(asset = %asset, "dispatched asset identifier");
        }
        Ok(next)
    }

    /// The backend deleted `asset`; stop tracking it.
    pub fn mark_deleted(&self, asset: &AssetId) -> Result<(), StoreError> {
        self.resolve(asset, Outcome::Deleted)
    }

    /// The delete attempt failed; stop tracking it anyway.
    ///
    /// There is no retry: a new enqueue is needed to try again.
    pub fn mark_failed(&self, asset: &AssetId) -> Result<(), StoreError> {
        self.resolve(asset, Outcome::Failed)
    }

    /// Report an executor outcome. Idempotent for unknown identifiers.
    pub fn resolve(&self, asset: &AssetId, outcome: Outcome) -> Result<(), StoreError> {
        self.lock().resolve(asset, outcome)?;
        match outcome {
            Outcome::Deleted => {
                tracing::debug!(asset = %asset, "successfully deleted asset identifier")
            }
            Outcome::Failed => tracing::warn!(asset = %asset, "failed to delete asset identifier"),
        }
        Ok(())
    }

    /// Return an in-flight identifier to the eligible set without resolving it.
    ///
    /// Used when an executor goes away mid-attempt. Wakes consumers if
    /// anything was released.
    pub fn release(&self, asset: &AssetId) -> bool {
        let released = self.lock().release(asset);
        if released {
            tracing::debug!(asset = %asset, "released in-flight asset identifier");
            self.wake.signal_work_available();
        }
        released
    }

    /// Pending identifiers with their in-flight flag.
    pub fn snapshot(&self) -> Result<Vec<PendingEntry>, StoreError> {
        self.lock().snapshot()
    }

    // Each critical section leaves the state consistent before any call
    // that can panic, so a poisoned lock still guards valid state.
    fn lock(&self) -> MutexGuard<'_, DispatchState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
