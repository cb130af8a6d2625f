/// Performance and availability metrics for a node.
///
/// Counters for operations, conflicts, and read repairs; rolling latency
/// windows for reads and writes; quorum success rates; and per-node
/// response tallies. Everything lives behind one coarse mutex with short
/// critical sections, and the summary is computed under a single
/// acquisition so aggregate getters never re-enter.
///
/// Metrics are an injected dependency of the coordinator and transport,
/// not a process-global.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Samples kept per rolling latency window.
const LATENCY_WINDOW: usize = 1000;

/// Outcome of a single replica call, for per-node health tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Replica acknowledged.
    Success,
    /// Replica answered with an error.
    Failure,
    /// Call exceeded the RPC timeout.
    Timeout,
}

#[derive(Debug, Default, Clone)]
struct NodeTally {
    success: u64,
    failure: u64,
    timeout: u64,
}

#[derive(Debug, Default)]
struct MetricsInner {
    read_count: u64,
    write_count: u64,
    read_repair_count: u64,
    conflict_count: u64,

    read_latencies: VecDeque<f64>,
    write_latencies: VecDeque<f64>,

    read_quorum_success: u64,
    read_quorum_failure: u64,
    write_quorum_success: u64,
    write_quorum_failure: u64,

    node_responses: HashMap<String, NodeTally>,
}

/// Thread-safe metrics registry.
#[derive(Debug)]
pub struct Metrics {
    inner: Mutex<MetricsInner>,
    started_at: DateTime<Utc>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsInner::default()),
            started_at: Utc::now(),
        }
    }

    /// When this registry (and the node carrying it) came up.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsInner> {
        // A poisoned metrics lock only means a panic mid-update; the
        // counters are still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a completed read and its quorum outcome.
    pub fn record_read(&self, latency_ms: f64, quorum_met: bool) {
        let mut inner = self.lock();
        inner.read_count += 1;
        push_latency(&mut inner.read_latencies, latency_ms);
        if quorum_met {
            inner.read_quorum_success += 1;
        } else {
            inner.read_quorum_failure += 1;
        }
    }

    /// Record a completed write (or delete) and its quorum outcome.
    pub fn record_write(&self, latency_ms: f64, quorum_met: bool) {
        let mut inner = self.lock();
        inner.write_count += 1;
        push_latency(&mut inner.write_latencies, latency_ms);
        if quorum_met {
            inner.write_quorum_success += 1;
        } else {
            inner.write_quorum_failure += 1;
        }
    }

    /// Record that a read returned divergent siblings.
    pub fn record_conflict(&self) {
        self.lock().conflict_count += 1;
    }

    /// Record a performed read repair.
    pub fn record_read_repair(&self) {
        self.lock().read_repair_count += 1;
    }

    /// Record a single replica call outcome against a node.
    pub fn record_node_response(&self, node: &str, outcome: NodeOutcome) {
        let mut inner = self.lock();
        let tally = inner.node_responses.entry(node.to_string()).or_default();
        match outcome {
            NodeOutcome::Success => tally.success += 1,
            NodeOutcome::Failure => tally.failure += 1,
            NodeOutcome::Timeout => tally.timeout += 1,
        }
    }

    /// Snapshot of all metrics.
    pub fn summary(&self) -> MetricsSummary {
        let inner = self.lock();

        let node_health = inner
            .node_responses
            .iter()
            .map(|(node, tally)| {
                let total = tally.success + tally.failure + tally.timeout;
                (
                    node.clone(),
                    NodeHealth {
                        success_rate: rate(tally.success, total),
                        timeout_rate: rate(tally.timeout, total),
                        total_requests: total,
                    },
                )
            })
            .collect();

        MetricsSummary {
            operations: OperationCounts {
                reads: inner.read_count,
                writes: inner.write_count,
                read_repairs: inner.read_repair_count,
                conflicts: inner.conflict_count,
            },
            quorum_rates: QuorumRates {
                read_success_rate: rate(
                    inner.read_quorum_success,
                    inner.read_quorum_success + inner.read_quorum_failure,
                ),
                write_success_rate: rate(
                    inner.write_quorum_success,
                    inner.write_quorum_success + inner.write_quorum_failure,
                ),
            },
            latency: LatencySummary {
                read: latency_stats(&inner.read_latencies),
                write: latency_stats(&inner.write_latencies),
            },
            node_health,
            started_at: self.started_at,
        }
    }

    /// Reset every counter and window.
    pub fn reset(&self) {
        *self.lock() = MetricsInner::default();
    }
}

fn push_latency(window: &mut VecDeque<f64>, latency_ms: f64) {
    if window.len() == LATENCY_WINDOW {
        window.pop_front();
    }
    window.push_back(latency_ms);
}

fn rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn latency_stats(window: &VecDeque<f64>) -> LatencyStats {
    if window.is_empty() {
        return LatencyStats::default();
    }

    let mut sorted: Vec<f64> = window.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let p95_idx = ((sorted.len() as f64 * 0.95) as usize).min(sorted.len() - 1);

    LatencyStats {
        avg: sorted.iter().sum::<f64>() / sorted.len() as f64,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        p95: sorted[p95_idx],
    }
}

/// Latency statistics over the rolling window, in milliseconds.
#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct LatencyStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
}

/// Operation counters.
#[derive(Debug, Clone, Serialize)]
pub struct OperationCounts {
    pub reads: u64,
    pub writes: u64,
    pub read_repairs: u64,
    pub conflicts: u64,
}

/// Quorum success rates.
#[derive(Debug, Clone, Serialize)]
pub struct QuorumRates {
    pub read_success_rate: f64,
    pub write_success_rate: f64,
}

/// Read and write latency windows.
#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub read: LatencyStats,
    pub write: LatencyStats,
}

/// Health view of a single peer.
#[derive(Debug, Clone, Serialize)]
pub struct NodeHealth {
    pub success_rate: f64,
    pub timeout_rate: f64,
    pub total_requests: u64,
}

/// Full metrics snapshot, as served on `/metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub operations: OperationCounts,
    pub quorum_rates: QuorumRates,
    pub latency: LatencySummary,
    pub node_health: HashMap<String, NodeHealth>,
    pub started_at: DateTime<Utc>,
}
