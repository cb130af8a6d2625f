/// Request coordination: the PUT / GET / DELETE state machine.
///
/// Any node coordinates any key, replica or not. All three operations
/// share one skeleton: obtain the preference list, gather causal context,
/// derive or collect versions, dispatch to every replica in parallel
/// (the local replica bypasses RPC), evaluate the quorum, and record the
/// outcome. Reads additionally resolve siblings, decide tombstone
/// visibility, and trigger read repair.
///
/// Transport failures toward single replicas never short-circuit an
/// operation: the coordinator waits for all N dispatches or their
/// timeouts, then counts. A missed quorum leaves partial side effects in
/// place on purpose; read repair reconciles them on later reads.
use crate::metrics::Metrics;
use crate::quorum::{collect_read_quorum, write_quorum_met};
use crate::repair::perform_read_repair;
use crate::replication::ReplicationManager;
use crate::resolve::resolve_versions;
use crate::rpc::ReplicaTransport;
use crate::storage::MemoryStorage;
use crate::types::{Causality, Version};
use futures::future::join_all;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Apply a replicated write on the receiving side: append the version,
/// then compact the sibling list to its causally maximal survivors.
///
/// Used by the coordinator's local dispatch and by the internal PUT
/// handler, so every replica converges to the same compacted state no
/// matter which path delivered the write.
pub fn apply_replica_write(storage: &MemoryStorage, key: &str, version: Version) {
    storage.put(key, version);
    let compacted = resolve_versions(&storage.get_all(key));
    storage.overwrite(key, compacted);
}

/// Coordinates client operations across the key's replicas.
pub struct Coordinator {
    node_id: String,
    storage: Arc<MemoryStorage>,
    replication: ReplicationManager,
    transport: Arc<dyn ReplicaTransport>,
    metrics: Arc<Metrics>,
}

impl Coordinator {
    /// Create a coordinator for this node.
    pub fn new(
        node_id: String,
        storage: Arc<MemoryStorage>,
        replication: ReplicationManager,
        transport: Arc<dyn ReplicaTransport>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            node_id,
            storage,
            replication,
            transport,
            metrics,
        }
    }

    /// This node's identifier.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The local storage instance.
    pub fn storage(&self) -> &Arc<MemoryStorage> {
        &self.storage
    }

    // ---------------- WRITE PATH ---------------- //

    /// Write `value` under `key` across `n` replicas, succeeding once `w`
    /// acknowledge. Returns whether the write quorum was met.
    pub async fn put(&self, key: &str, value: JsonValue, n: usize, w: usize) -> bool {
        let start = Instant::now();

        let new_version = {
            let replicas = self.replication.get_replicas(key, n);
            let context = self.gather_context(key, &replicas).await;

            let mut clock = crate::types::VectorClock::new();
            for version in &context {
                clock.merge(&version.vector_clock);
            }
            clock.increment(&self.node_id);

            Version::live(value, clock)
        };

        let success = self.dispatch_write(key, &new_version, n, w).await;
        self.metrics.record_write(elapsed_ms(start), success);
        success
    }

    // ---------------- DELETE PATH ---------------- //

    /// Delete `key` by replicating a tombstone, subject to the same quorum
    /// rules as a write.
    pub async fn delete(&self, key: &str, n: usize, w: usize) -> bool {
        let start = Instant::now();

        let tombstone = {
            let replicas = self.replication.get_replicas(key, n);
            let context = self.gather_context(key, &replicas).await;

            let mut clock = crate::types::VectorClock::new();
            for version in &context {
                clock.merge(&version.vector_clock);
            }
            clock.increment(&self.node_id);

            Version::tombstone(clock)
        };

        let success = self.dispatch_write(key, &tombstone, n, w).await;
        self.metrics.record_write(elapsed_ms(start), success);
        success
    }

    // ---------------- READ PATH ---------------- //

    /// Read `key` from `n` replicas, requiring `r` responses. Returns the
    /// causally maximal live siblings, or an empty list when the key is
    /// absent, deleted, or the read quorum was missed.
    pub async fn get(&self, key: &str, r: usize, n: usize) -> Vec<Version> {
        let start = Instant::now();

        let replicas = self.replication.get_replicas(key, n);
        let responses = self.fan_out_reads(key, &replicas).await;

        let (read_versions, quorum_met) = collect_read_quorum(&responses, r);
        if !quorum_met {
            tracing::debug!(key, r, responding = responses.values().filter(|v| v.is_some()).count(),
                "read quorum missed");
            self.metrics.record_read(elapsed_ms(start), false);
            return Vec::new();
        }

        let resolved = resolve_versions(&read_versions);

        let (tombstones, live): (Vec<Version>, Vec<Version>) =
            resolved.into_iter().partition(|v| v.is_tombstone());

        let kept = match (tombstones.is_empty(), live.is_empty()) {
            (true, true) => Vec::new(),
            (false, true) => tombstones,
            (true, false) => live,
            (false, false) => {
                // Both sides present: the causally largest version decides
                // visibility, with ties going to the tombstone.
                match (vc_max(&tombstones), vc_max(&live)) {
                    (Some(latest_tombstone), Some(latest_live)) => {
                        match latest_tombstone
                            .vector_clock
                            .compare(&latest_live.vector_clock)
                        {
                            Causality::Dominates | Causality::Equal => tombstones,
                            _ => live,
                        }
                    }
                    _ => live,
                }
            }
        };

        if kept.is_empty() {
            self.metrics.record_read(elapsed_ms(start), true);
            return Vec::new();
        }

        if kept.iter().all(Version::is_tombstone) {
            // Deleted: propagate the tombstones, hide them from the client.
            self.spawn_read_repair(key, kept, responses);
            self.metrics.record_read(elapsed_ms(start), true);
            return Vec::new();
        }

        if kept.len() > 1 {
            tracing::debug!(key, siblings = kept.len(), "returning concurrent siblings");
            self.metrics.record_conflict();
        }

        self.spawn_read_repair(key, kept.clone(), responses);
        self.metrics.record_read(elapsed_ms(start), true);
        kept
    }

    // ---------------- SHARED STEPS ---------------- //

    /// Union of local versions and every other replica's versions,
    /// tombstones included. Feeds the vector clock merge for writes.
    async fn gather_context(&self, key: &str, replicas: &[String]) -> Vec<Version> {
        let mut context = self.storage.get_all(key);

        let remote_reads = replicas
            .iter()
            .filter(|node| **node != self.node_id)
            .map(|node| self.transport.send_get(node, key));

        for response in join_all(remote_reads).await.into_iter().flatten() {
            context.extend(response);
        }

        context
    }

    /// Dispatch one version to every replica in parallel and evaluate the
    /// write quorum. The local replica is applied directly to storage.
    async fn dispatch_write(&self, key: &str, version: &Version, n: usize, w: usize) -> bool {
        let replicas = self.replication.get_replicas(key, n);

        let dispatches = replicas.iter().map(|node| {
            let version = version.clone();
            async move {
                let acknowledged = if *node == self.node_id {
                    apply_replica_write(&self.storage, key, version);
                    true
                } else {
                    self.transport.send_put(node, key, &version).await
                };
                (node.clone(), acknowledged)
            }
        });

        let responses: HashMap<String, bool> = join_all(dispatches).await.into_iter().collect();
        let success = write_quorum_met(&responses, w);
        if !success {
            tracing::warn!(
                key,
                w,
                acknowledged = responses.values().filter(|ok| **ok).count(),
                "write quorum missed"
            );
        }
        success
    }

    /// Read the full multi-version state from every replica in parallel.
    async fn fan_out_reads(
        &self,
        key: &str,
        replicas: &[String],
    ) -> HashMap<String, Option<Vec<Version>>> {
        let reads = replicas.iter().map(|node| async move {
            let response = if *node == self.node_id {
                Some(self.storage.get_all(key))
            } else {
                self.transport.send_get(node, key).await
            };
            (node.clone(), response)
        });

        join_all(reads).await.into_iter().collect()
    }

    /// Fire-and-forget repair of the contacted replicas toward the
    /// resolved version set.
    fn spawn_read_repair(
        &self,
        key: &str,
        latest_versions: Vec<Version>,
        replica_responses: HashMap<String, Option<Vec<Version>>>,
    ) {
        let key = key.to_string();
        let transport = Arc::clone(&self.transport);
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            let repaired =
                perform_read_repair(&key, &latest_versions, &replica_responses, transport.as_ref())
                    .await;
            if repaired {
                metrics.record_read_repair();
            }
        });
    }
}

/// The version with the causally largest clock: greatest counter sum,
/// ties broken by the deterministic total order so every node picks the
/// same winner.
fn vc_max(versions: &[Version]) -> Option<&Version> {
    versions
        .iter()
        .max_by_key(|v| v.vector_clock.total_order_key())
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
