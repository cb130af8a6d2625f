/// Replica selection.
///
/// Thin seam between the coordinator and the hash ring: given a key and a
/// replication factor, produce the preference list. The first node in the
/// list is the routing primary but has no privileged role for durability;
/// any node may coordinate any key.
use crate::ring::HashRing;
use std::sync::Arc;

/// Selects replica nodes for keys from the shared ring.
#[derive(Debug, Clone)]
pub struct ReplicationManager {
    ring: Arc<HashRing>,
}

impl ReplicationManager {
    /// Create a manager over the given ring.
    pub fn new(ring: Arc<HashRing>) -> Self {
        Self { ring }
    }

    /// Preference list: up to `n` distinct nodes responsible for `key`.
    pub fn get_replicas(&self, key: &str, n: usize) -> Vec<String> {
        self.ring.nodes_for_key(key, n)
    }

    /// The ring backing this manager.
    pub fn ring(&self) -> &HashRing {
        &self.ring
    }
}
