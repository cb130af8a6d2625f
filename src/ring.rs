/// Consistent hash ring with virtual nodes.
///
/// The ring maps every key to an ordered preference list of physical nodes.
/// Each physical node contributes `vnodes` points placed by hashing
/// `"<node>#<i>"`; a key is served by the distinct physical nodes found by
/// walking clockwise from the first point at or past the key's own hash.
///
/// The point hash is MD5 truncated to the low 32 bits. Any hash with good
/// avalanche would do, but it must stay fixed per deployment: every node
/// derives the same preference lists from the same membership, with no
/// coordination.
///
/// The ring is read-only after construction in the current scope;
/// `add_node`/`remove_node` define the contract for dynamic membership as
/// a permissible extension.
use crate::config::DEFAULT_VNODES;
use md5::{Digest, Md5};

/// Hash a key to a 32-bit ring position.
pub fn hash_key(key: &str) -> u32 {
    let digest = Md5::digest(key.as_bytes());
    // Low 32 bits of the 128-bit digest, big-endian.
    u32::from_be_bytes([digest[12], digest[13], digest[14], digest[15]])
}

/// Consistent hash ring.
#[derive(Debug, Clone)]
pub struct HashRing {
    vnodes: usize,
    /// Ring points sorted by position. Points with equal positions keep
    /// insertion order, which makes collisions deterministic.
    points: Vec<(u32, String)>,
}

impl HashRing {
    /// Build a ring over the given physical nodes.
    pub fn new(nodes: &[String], vnodes: usize) -> Self {
        let mut ring = Self {
            vnodes,
            points: Vec::with_capacity(nodes.len() * vnodes),
        };
        for node in nodes {
            ring.add_node(node);
        }
        ring
    }

    /// Build a ring with the default virtual node multiplicity.
    pub fn with_default_vnodes(nodes: &[String]) -> Self {
        Self::new(nodes, DEFAULT_VNODES)
    }

    /// Add a physical node with all of its virtual points.
    pub fn add_node(&mut self, node: &str) {
        for i in 0..self.vnodes {
            let position = hash_key(&format!("{}#{}", node, i));
            // Insert after any existing points at the same position so that
            // ties resolve by insertion order.
            let idx = self.points.partition_point(|(p, _)| *p <= position);
            self.points.insert(idx, (position, node.to_string()));
        }
    }

    /// Remove a physical node and all of its virtual points.
    pub fn remove_node(&mut self, node: &str) {
        self.points.retain(|(_, owner)| owner != node);
    }

    /// Return up to `n` distinct physical nodes responsible for `key`,
    /// in preference order. Returns fewer than `n` only when the ring has
    /// fewer than `n` physical nodes.
    pub fn nodes_for_key(&self, key: &str, n: usize) -> Vec<String> {
        if self.points.is_empty() || n == 0 {
            return Vec::new();
        }

        let position = hash_key(key);
        // First point at or past the key's position.
        let start = self.points.partition_point(|(p, _)| *p < position);

        let mut result: Vec<String> = Vec::with_capacity(n);

        for step in 0..self.points.len() {
            let (_, node) = &self.points[(start + step) % self.points.len()];
            if !result.iter().any(|seen| seen == node) {
                result.push(node.clone());
                if result.len() == n {
                    break;
                }
            }
        }

        result
    }

    /// Number of points on the ring.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the ring has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Distinct physical nodes currently on the ring.
    pub fn physical_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = Vec::new();
        for (_, node) in &self.points {
            if !nodes.iter().any(|seen| seen == node) {
                nodes.push(node.clone());
            }
        }
        nodes.sort();
        nodes
    }
}
