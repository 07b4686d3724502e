//! Daemon state: connection roles and per-executor claims.
//!
//! Owned exclusively by the daemon loop. The pending/in-flight sets live
//! in the [`DeletionQueue`]; this layer only remembers which executor
//! connection holds which identifier, so claims can be released if that
//! executor disconnects without reporting an outcome.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::asset::AssetId;
use crate::ipc::protocol::Role;
use crate::queue::DeletionQueue;
use crate::store::IdentifierStore;

/// Unique identifier for a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DaemonState<S> {
    queue: DeletionQueue<S>,
    /// Role of every connection that completed the handshake.
    roles: HashMap<ConnectionId, Role>,
    /// Identifiers handed to each executor connection and not yet resolved.
    claims: HashMap<ConnectionId, HashSet<AssetId>>,
}

impl<S: IdentifierStore> DaemonState<S> {
    pub fn new(queue: DeletionQueue<S>) -> Self {
        Self {
            queue,
            roles: HashMap::new(),
            claims: HashMap::new(),
        }
    }

    pub fn queue(&self) -> &DeletionQueue<S> {
        &self.queue
    }

    /// Record a connection's role after a successful handshake.
    pub fn add_connection(&mut self, id: ConnectionId, role: Role) {
        self.roles.insert(id, role);
    }

    pub fn connection_role(&self, id: ConnectionId) -> Option<Role> {
        self.roles.get(&id).copied()
    }

    /// Forget a connection and release everything it still had in flight.
    ///
    /// Returns the released identifiers.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Vec<AssetId> {
        self.roles.remove(&id);
        let Some(claimed) = self.claims.remove(&id) else {
            return Vec::new();
        };
        claimed
            .into_iter()
            .filter(|asset| self.queue.release(asset))
            .collect()
    }

    /// Note that `asset` was handed to executor `id`.
    pub fn claim(&mut self, id: ConnectionId, asset: AssetId) {
        self.claims.entry(id).or_default().insert(asset);
    }

    /// Drop `asset` from whichever executor claimed it.
    pub fn settle(&mut self, asset: &AssetId) {
        for claimed in self.claims.values_mut() {
            claimed.remove(asset);
        }
        self.claims.retain(|_, claimed| !claimed.is_empty());
    }

    /// Connections that should receive `work_available` pushes.
    pub fn executors(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.roles
            .iter()
            .filter(|(_, role)| **role == Role::Executor)
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn id(raw: &str) -> AssetId {
        AssetId::parse(raw).unwrap()
    }

    fn state() -> DaemonState<MemoryStore> {
        DaemonState::new(DeletionQueue::new(MemoryStore::new()))
    }

    #[test]
    fn roles_are_tracked() {
        let mut s = state();
        let c = ConnectionId::new();
        assert_eq!(s.connection_role(c), None);
        s.add_connection(c, Role::Producer);
        assert_eq!(s.connection_role(c), Some(Role::Producer));
        s.remove_connection(c);
        assert_eq!(s.connection_role(c), None);
    }

    #[test]
    fn executors_lists_only_executor_role() {
        let mut s = state();
        let producer = ConnectionId::new();
        let executor = ConnectionId::new();
        s.add_connection(producer, Role::Producer);
        s.add_connection(executor, Role::Executor);
        let found: Vec<_> = s.executors().collect();
        assert_eq!(found, vec![executor]);
    }

    #[test]
    fn disconnect_releases_unresolved_claims() {
        let mut s = state();
        let c = ConnectionId::new();
        s.add_connection(c, Role::Executor);
        s.queue().enqueue(id("a1")).unwrap();
        s.queue().enqueue(id("a2")).unwrap();

        let a = s.queue().request_next().unwrap().unwrap();
        s.claim(c, a.clone());
        let b = s.queue().request_next().unwrap().unwrap();
        s.claim(c, b.clone());

        s.queue().mark_deleted(&a).unwrap();
        s.settle(&a);

        let released = s.remove_connection(c);
        assert_eq!(released, vec![b.clone()]);
        assert_eq!(s.queue().request_next().unwrap(), Some(b));
    }

    #[test]
    fn disconnect_without_claims_releases_nothing() {
        let mut s = state();
        let c = ConnectionId::new();
        s.add_connection(c, Role::Executor);
        assert!(s.remove_connection(c).is_empty());
    }

    #[test]
    fn settle_clears_claim_from_any_connection() {
        let mut s = state();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        s.claim(c1, id("a1"));
        s.claim(c2, id("a2"));
        s.settle(&id("a1"));
        assert!(!s.claims.contains_key(&c1));
        assert!(s.claims.contains_key(&c2));
    }
}
