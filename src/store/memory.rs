use crate::asset::AssetId;

use super::{IdentifierStore, StoreError};

/// Non-durable store backed by an insertion-ordered vector.
///
/// Linear membership checks; pending sets are expected to stay small.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    ids: Vec<AssetId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<AssetId> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = AssetId>>(iter: I) -> Self {
        let mut store = Self::new();
        for id in iter {
            if !store.ids.contains(&id) {
                store.ids.push(id);
            }
        }
        store
    }
}

impl IdentifierStore for MemoryStore {
    fn read(&self) -> Result<Vec<AssetId>, StoreError> {
        Ok(self.ids.clone())
    }

    fn insert(&mut self, id: &AssetId) -> Result<(), StoreError> {
        if !self.ids.contains(id) {
            self.ids.push(id.clone());
        }
        Ok(())
    }

    fn remove(&mut self, id: &AssetId) -> Result<(), StoreError> {
        self.ids.retain(|existing| existing != id);
        Ok(())
    }
}
