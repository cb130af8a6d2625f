/// Cluster configuration: replication and quorum defaults, node identifier
/// handling, and parameter validation.
///
/// A driftkv cluster is a static set of equal peers. Each node is identified
/// by its `host:port` string, which doubles as its source name inside vector
/// clocks; the full peer list (including the node itself) defines the hash
/// ring for the lifetime of the process.
use crate::error::{DriftError, DriftResult};
use std::time::Duration;

/// Default replication factor (total replicas per key).
pub const DEFAULT_N: usize = 3;
/// Default read quorum (replicas that must respond).
pub const DEFAULT_R: usize = 2;
/// Default write quorum (replicas that must acknowledge).
pub const DEFAULT_W: usize = 2;

/// Default port a node listens on.
pub const DEFAULT_PORT: u16 = 5001;

/// Hard per-RPC timeout for replica calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(300);

/// Virtual nodes per physical node on the hash ring.
pub const DEFAULT_VNODES: usize = 100;

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// Replication and quorum settings for a node.
///
/// These are the per-node defaults; individual client requests may override
/// N, R, and W within the validated bounds.
#[derive(Debug, Clone)]
pub struct ReplicaSettings {
    /// Replication factor.
    pub n: usize,
    /// Read quorum.
    pub r: usize,
    /// Write quorum.
    pub w: usize,
    /// Hard timeout for each outbound replica RPC.
    pub request_timeout: Duration,
    /// Virtual node multiplicity on the ring.
    pub vnodes: usize,
}

impl Default for ReplicaSettings {
    fn default() -> Self {
        Self {
            n: DEFAULT_N,
            r: DEFAULT_R,
            w: DEFAULT_W,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            vnodes: DEFAULT_VNODES,
        }
    }
}

impl ReplicaSettings {
    /// Create settings with the cluster defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the replication factor.
    pub fn n(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    /// Set the read quorum.
    pub fn r(mut self, r: usize) -> Self {
        self.r = r;
        self
    }

    /// Set the write quorum.
    pub fn w(mut self, w: usize) -> Self {
        self.w = w;
        self
    }

    /// Set the per-RPC timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the virtual node multiplicity.
    pub fn vnodes(mut self, vnodes: usize) -> Self {
        self.vnodes = vnodes;
        self
    }

    /// Validate the configured defaults.
    pub fn validate(&self) -> DriftResult<()> {
        if validate_quorum_params(self.n, self.r, self.w) {
            Ok(())
        } else {
            Err(DriftError::InvalidQuorum {
                n: self.n,
                r: self.r,
                w: self.w,
            })
        }
    }

    /// Consistency level implied by the settings: "strong" iff R + W > N,
    /// "eventual" otherwise.
    pub fn consistency_level(&self) -> &'static str {
        if self.r + self.w > self.n {
            "strong"
        } else {
            "eventual"
        }
    }
}

/// Validate quorum parameters: all positive, R <= N, W <= N.
pub fn validate_quorum_params(n: usize, r: usize, w: usize) -> bool {
    if n == 0 || r == 0 || w == 0 {
        return false;
    }
    r <= n && w <= n
}

/// Validate a client key: non-empty, bounded length.
pub fn validate_key(key: &str) -> DriftResult<()> {
    if key.is_empty() {
        return Err(DriftError::InvalidKey {
            reason: "key must be non-empty".to_string(),
        });
    }
    if key.len() > MAX_KEY_LEN {
        return Err(DriftError::InvalidKey {
            reason: format!("key exceeds {} bytes", MAX_KEY_LEN),
        });
    }
    Ok(())
}

/// Parse a node identifier of the form `host:port`.
pub fn parse_node_id(node: &str) -> DriftResult<(String, u16)> {
    let (host, port_str) = node.rsplit_once(':').ok_or_else(|| DriftError::InvalidNodeId {
        given: node.to_string(),
    })?;

    if host.is_empty() {
        return Err(DriftError::InvalidNodeId {
            given: node.to_string(),
        });
    }

    let port = port_str
        .parse::<u16>()
        .map_err(|_| DriftError::InvalidNodeId {
            given: node.to_string(),
        })?;

    Ok((host.to_string(), port))
}

/// Format a `(host, port)` pair into a node identifier string.
pub fn format_node_id(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

/// Normalize a list of node identifiers: trim whitespace, drop malformed
/// entries, remove duplicates while preserving first-occurrence order.
pub fn normalize_node_list(nodes: &[String]) -> Vec<String> {
    let mut normalized = Vec::new();

    for node in nodes {
        let node = node.trim();
        if node.is_empty() || parse_node_id(node).is_err() {
            continue;
        }
        if !normalized.iter().any(|existing: &String| existing == node) {
            normalized.push(node.to_string());
        }
    }

    normalized
}
