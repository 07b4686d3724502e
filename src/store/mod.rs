//! Durable identifier store: the persisted pending set.
//!
//! The dispatch queue only needs three operations against the store:
//! read the current set, insert, and remove. Both operations that mutate
//! are set-semantic no-ops when there is nothing to change.

mod file;
mod memory;

use std::path::PathBuf;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::asset::AssetId;

/// Errors raised by a store backend.
///
/// Any of these is fatal to the queue operation that touched the store
/// and is returned to its caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read store {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: rmp_serde::decode::Error,
    },
    #[error("failed to encode store snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence backend for identifiers awaiting deletion.
///
/// Implementations must give read-after-write consistency within one
/// process. `read` returns each identifier once; the bundled stores keep
/// insertion order but callers must not rely on it.
pub trait IdentifierStore: Send {
    /// Current pending set.
    fn read(&self) -> Result<Vec<AssetId>, StoreError>;

    /// Add an identifier. Inserting a present identifier is a no-op.
    fn insert(&mut self, id: &AssetId) -> Result<(), StoreError>;

    /// Remove an identifier. Removing an absent identifier is a no-op.
    fn remove(&mut self, id: &AssetId) -> Result<(), StoreError>;
}

impl<S: IdentifierStore + ?Sized> IdentifierStore for Box<S> {
    fn read(&self) -> Result<Vec<AssetId>, StoreError> {
        (**self).read()
    }

    fn insert(&mut self, id: &AssetId) -> Result<(), StoreError> {
        (**self).insert(id)
    }

    fn remove(&mut self, id: &AssetId) -> Result<(), StoreError> {
        (**self).remove(id)
    }
}
