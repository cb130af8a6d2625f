/// Common types for driftkv: vector clocks and versioned values.
///
/// A vector clock tracks the happens-before relationship between writes
/// across nodes. Each node increments its own counter on every write it
/// coordinates; missing entries count as zero. A `Version` is one sibling
/// in a key's multi-version state: an opaque JSON payload stamped with the
/// clock at the moment of write, or a tombstone marking a logical delete.
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Outcome of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    /// Same causal position.
    Equal,
    /// Left happened-after right.
    Dominates,
    /// Left happened-before right.
    IsDominated,
    /// Neither observed the other.
    Concurrent,
}

/// Vector clock for causal ordering.
///
/// Counters only ever increase at their owning node via [`VectorClock::increment`];
/// `merge` takes the element-wise maximum and is idempotent, commutative,
/// and associative, with the empty clock as identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    /// Node ID -> logical counter mapping.
    pub clocks: HashMap<String, u64>,
}

impl VectorClock {
    /// Create a new empty vector clock.
    pub fn new() -> Self {
        Self {
            clocks: HashMap::new(),
        }
    }

    /// Increment the counter for a specific node (absent counts as zero).
    pub fn increment(&mut self, node_id: &str) {
        let entry = self.clocks.entry(node_id.to_string()).or_insert(0);
        *entry += 1;
    }

    /// Merge another vector clock into this one, taking the max per node.
    pub fn merge(&mut self, other: &VectorClock) {
        for (node_id, counter) in &other.clocks {
            let entry = self.clocks.entry(node_id.clone()).or_insert(0);
            *entry = (*entry).max(*counter);
        }
    }

    /// Compare two vector clocks, treating missing entries as zero.
    pub fn compare(&self, other: &VectorClock) -> Causality {
        let mut self_bigger = false;
        let mut other_bigger = false;

        let all_nodes: std::collections::HashSet<_> =
            self.clocks.keys().chain(other.clocks.keys()).collect();

        for node_id in all_nodes {
            let a = self.clocks.get(node_id).copied().unwrap_or(0);
            let b = other.clocks.get(node_id).copied().unwrap_or(0);

            match a.cmp(&b) {
                std::cmp::Ordering::Greater => self_bigger = true,
                std::cmp::Ordering::Less => other_bigger = true,
                std::cmp::Ordering::Equal => {}
            }
        }

        match (self_bigger, other_bigger) {
            (false, false) => Causality::Equal,
            (true, false) => Causality::Dominates,
            (false, true) => Causality::IsDominated,
            (true, true) => Causality::Concurrent,
        }
    }

    /// Check if this clock strictly dominates (happened after) another.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        self.compare(other) == Causality::Dominates
    }

    /// Check if this clock is strictly dominated by another.
    pub fn is_dominated_by(&self, other: &VectorClock) -> bool {
        self.compare(other) == Causality::IsDominated
    }

    /// Check if the clocks are concurrent.
    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        self.compare(other) == Causality::Concurrent
    }

    /// Sum of all counters. Used as the primary key when picking the
    /// causally "largest" version out of a set of siblings.
    pub fn causal_sum(&self) -> u64 {
        self.clocks.values().sum()
    }

    /// Deterministic total order over clocks, for tie-breaking only.
    ///
    /// Orders by causal sum first, then by the sorted (node, counter) pair
    /// list. Unrelated to causality, but identical on every node, so
    /// visibility decisions that fall back to it agree cluster-wide.
    pub fn total_order_key(&self) -> (u64, Vec<(String, u64)>) {
        let mut pairs: Vec<(String, u64)> = self
            .clocks
            .iter()
            .map(|(node, counter)| (node.clone(), *counter))
            .collect();
        pairs.sort();
        (self.causal_sum(), pairs)
    }
}

impl<const N: usize> From<[(&str, u64); N]> for VectorClock {
    fn from(entries: [(&str, u64); N]) -> Self {
        Self {
            clocks: entries
                .iter()
                .map(|(node, counter)| (node.to_string(), *counter))
                .collect(),
        }
    }
}

/// One sibling in a key's multi-version state.
///
/// Tombstones carry `deleted: true` and a null value; they replicate,
/// merge, and quorum exactly like live writes. On the wire the `deleted`
/// flag is omitted when false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// Opaque payload; null for tombstones.
    pub value: JsonValue,
    /// Clock at the moment of write.
    pub vector_clock: VectorClock,
    /// Tombstone flag.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl Version {
    /// Create a live version.
    pub fn live(value: JsonValue, vector_clock: VectorClock) -> Self {
        Self {
            value,
            vector_clock,
            deleted: false,
        }
    }

    /// Create a tombstone.
    pub fn tombstone(vector_clock: VectorClock) -> Self {
        Self {
            value: JsonValue::Null,
            vector_clock,
            deleted: true,
        }
    }

    /// Whether this version is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.deleted
    }

    /// Duplicate test: equal payload AND equal clock.
    pub fn is_duplicate_of(&self, other: &Version) -> bool {
        self.value == other.value && self.vector_clock == other.vector_clock
    }
}
