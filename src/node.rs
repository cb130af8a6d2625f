/// Node bootstrap: wire the ring, storage, coordinator, and HTTP surface
/// into one running peer.
///
/// Every node is identical; there are no masters. A node starts from its
/// own identifier (`host:port`, also its vector clock source name) and the
/// static list of all cluster members, builds the hash ring once, and
/// serves both the client and internal surfaces from the same listener.
use crate::config::{normalize_node_list, parse_node_id, ReplicaSettings};
use crate::coordinator::Coordinator;
use crate::error::DriftResult;
use crate::failure::FailureDetector;
use crate::http::{self, AppState};
use crate::metrics::Metrics;
use crate::replication::ReplicationManager;
use crate::ring::HashRing;
use crate::rpc::HttpTransport;
use crate::storage::MemoryStorage;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Configuration for one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's identifier, `host:port`. Peers reach the node at this
    /// address.
    pub node_id: String,
    /// Every cluster member, this node included. Defines the ring.
    pub nodes: Vec<String>,
    /// Interface to bind; the port comes from `node_id`.
    pub bind_host: String,
    /// Replication and quorum defaults.
    pub settings: ReplicaSettings,
}

impl NodeConfig {
    /// Create a config for the given node identifier, alone in its ring.
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            nodes: vec![node_id.clone()],
            node_id,
            bind_host: "0.0.0.0".to_string(),
            settings: ReplicaSettings::default(),
        }
    }

    /// Set the full cluster membership.
    pub fn nodes(mut self, nodes: Vec<String>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Set the interface to bind.
    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    /// Set the replication defaults.
    pub fn settings(mut self, settings: ReplicaSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// A running driftkv peer.
pub struct Node {
    config: NodeConfig,
    state: AppState,
}

impl Node {
    /// Build a node from its configuration: validate the identifier,
    /// normalize the membership list, and construct the component graph.
    pub fn new(config: NodeConfig) -> DriftResult<Self> {
        parse_node_id(&config.node_id)?;
        config.settings.validate()?;

        let mut nodes = normalize_node_list(&config.nodes);
        if !nodes.iter().any(|n| *n == config.node_id) {
            nodes.push(config.node_id.clone());
        }

        let ring = Arc::new(HashRing::new(&nodes, config.settings.vnodes));
        let storage = Arc::new(MemoryStorage::new());
        let failures = Arc::new(FailureDetector::default());
        let metrics = Arc::new(Metrics::new());
        let transport = Arc::new(HttpTransport::new(
            config.settings.request_timeout,
            Arc::clone(&failures),
            Arc::clone(&metrics),
        ));

        let coordinator = Arc::new(Coordinator::new(
            config.node_id.clone(),
            storage,
            ReplicationManager::new(ring),
            transport,
            Arc::clone(&metrics),
        ));

        let state = AppState {
            coordinator,
            failures,
            metrics,
            settings: config.settings.clone(),
            ring_nodes: nodes,
        };

        Ok(Self { config, state })
    }

    /// This node's identifier.
    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    /// The node's handler state; useful for embedding the router.
    pub fn app_state(&self) -> AppState {
        self.state.clone()
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn serve(self) -> DriftResult<()> {
        let (_, port) = parse_node_id(&self.config.node_id)?;
        let addr = format!("{}:{}", self.config.bind_host, port);

        tracing::info!(
            node_id = %self.config.node_id,
            addr = %addr,
            cluster = self.state.ring_nodes.len(),
            n = self.config.settings.n,
            r = self.config.settings.r,
            w = self.config.settings.w,
            "node starting"
        );

        http::serve(&addr, self.state).await
    }

    /// Serve on a pre-bound listener. Lets tests reserve port 0 before the
    /// ring membership is fixed.
    pub async fn serve_on(self, listener: TcpListener) -> DriftResult<()> {
        tracing::info!(node_id = %self.config.node_id, "node starting on pre-bound listener");
        http::serve_on(listener, self.state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriftError;

    #[test]
    fn test_node_requires_valid_id() {
        assert!(Node::new(NodeConfig::new("not-an-address")).is_err());
        assert!(Node::new(NodeConfig::new("127.0.0.1:5001")).is_ok());
    }

    #[test]
    fn test_node_rejects_bad_settings() {
        let config =
            NodeConfig::new("127.0.0.1:5001").settings(ReplicaSettings::new().n(3).r(4).w(2));
        assert!(matches!(
            Node::new(config),
            Err(DriftError::InvalidQuorum { .. })
        ));
    }

    #[test]
    fn test_membership_always_includes_self() {
        let config = NodeConfig::new("127.0.0.1:5001")
            .nodes(vec!["127.0.0.1:5002".to_string(), "127.0.0.1:5003".to_string()]);
        let node = Node::new(config).unwrap();
        assert!(node
            .app_state()
            .ring_nodes
            .contains(&"127.0.0.1:5001".to_string()));
        assert_eq!(node.app_state().ring_nodes.len(), 3);
    }

    #[test]
    fn test_malformed_peers_dropped() {
        let config = NodeConfig::new("127.0.0.1:5001").nodes(vec![
            "127.0.0.1:5001".to_string(),
            "garbage".to_string(),
            " 127.0.0.1:5002 ".to_string(),
        ]);
        let node = Node::new(config).unwrap();
        assert_eq!(
            node.app_state().ring_nodes,
            vec!["127.0.0.1:5001", "127.0.0.1:5002"]
        );
    }
}
