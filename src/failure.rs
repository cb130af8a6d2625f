/// Failure detection for peer nodes.
///
/// Accumulates per-node failure signals from the RPC layer and marks a
/// node failed after repeated failures inside a sliding window. The
/// detector is advisory: preference-list composition does not consult it,
/// but the failed set is exposed for observability and future routing
/// policies.
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Failures in the window before a node is marked failed.
pub const DEFAULT_FAILURE_THRESHOLD: usize = 3;

/// Sliding window over which failures count.
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Kinds of failure a replica call can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Call exceeded the per-RPC timeout.
    Timeout,
    /// Connection or protocol failure.
    NetworkError,
    /// Node could not be reached at all.
    NodeUnreachable,
    /// Not enough replicas responded or acknowledged.
    QuorumFailure,
}

/// Tracks recent failures per node and the derived failed set.
#[derive(Debug)]
pub struct FailureDetector {
    threshold: usize,
    window: Duration,
    history: DashMap<String, Vec<Instant>>,
    failed: DashSet<String>,
}

impl Default for FailureDetector {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_FAILURE_WINDOW)
    }
}

impl FailureDetector {
    /// Create a detector with an explicit threshold and window.
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            threshold,
            window,
            history: DashMap::new(),
            failed: DashSet::new(),
        }
    }

    /// Record a failure for a node. Marks the node failed once the
    /// threshold is reached within the window.
    pub fn record_failure(&self, node: &str, kind: FailureKind) {
        let now = Instant::now();
        let mut entry = self.history.entry(node.to_string()).or_default();
        entry.push(now);
        entry.retain(|ts| now.duration_since(*ts) < self.window);
        let recent = entry.len();
        drop(entry);

        tracing::debug!(node, ?kind, recent, "replica failure recorded");

        if recent >= self.threshold && self.failed.insert(node.to_string()) {
            tracing::warn!(node, recent, "node marked failed");
        }
    }

    /// Record a success for a node: clears its history and failed mark.
    pub fn record_success(&self, node: &str) {
        if self.failed.remove(node).is_some() {
            tracing::info!(node, "node recovered");
        }
        self.history.remove(node);
    }

    /// Whether the node is currently marked failed.
    pub fn is_node_failed(&self, node: &str) -> bool {
        self.failed.contains(node)
    }

    /// Snapshot of the currently failed nodes, sorted.
    pub fn failed_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.failed.iter().map(|n| n.key().clone()).collect();
        nodes.sort();
        nodes
    }
}
