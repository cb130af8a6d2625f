/// Node-to-node RPC client.
///
/// Replicas talk over the internal HTTP surface: a single-version PUT that
/// appends at the receiver, and a GET that returns every stored version,
/// tombstones included. The transport is a trait so the coordinator can be
/// exercised against in-memory replicas in tests.
///
/// Failures are absorbed here, never raised: a PUT reports `false`, a GET
/// reports `None`, and the outcome is recorded against the node in the
/// failure detector and metrics. The quorum layer decides what partial
/// results mean.
use crate::failure::{FailureDetector, FailureKind};
use crate::metrics::{Metrics, NodeOutcome};
use crate::types::Version;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Transport used by the coordinator to reach replicas.
#[async_trait]
pub trait ReplicaTransport: Send + Sync {
    /// Send one version to a replica for appending. Returns whether the
    /// replica acknowledged.
    async fn send_put(&self, node: &str, key: &str, version: &Version) -> bool;

    /// Fetch all versions a replica holds for the key, tombstones
    /// included. `None` on transport failure; an empty list is a valid
    /// response.
    async fn send_get(&self, node: &str, key: &str) -> Option<Vec<Version>>;
}

#[derive(Debug, Deserialize)]
struct VersionsBody {
    versions: Vec<Version>,
}

/// HTTP transport over the internal surface, with a hard per-call timeout.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
    failures: Arc<FailureDetector>,
    metrics: Arc<Metrics>,
}

impl HttpTransport {
    /// Create a transport with the given per-call timeout.
    pub fn new(timeout: Duration, failures: Arc<FailureDetector>, metrics: Arc<Metrics>) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            failures,
            metrics,
        }
    }

    fn internal_url(node: &str, key: &str) -> String {
        format!("http://{}/internal/kv/{}", node, key)
    }

    fn record_outcome(&self, node: &str, outcome: NodeOutcome) {
        match outcome {
            NodeOutcome::Success => {
                self.failures.record_success(node);
            }
            NodeOutcome::Timeout => {
                self.failures.record_failure(node, FailureKind::Timeout);
            }
            NodeOutcome::Failure => {
                self.failures.record_failure(node, FailureKind::NetworkError);
            }
        }
        self.metrics.record_node_response(node, outcome);
    }
}

#[async_trait]
impl ReplicaTransport for HttpTransport {
    async fn send_put(&self, node: &str, key: &str, version: &Version) -> bool {
        let result = self
            .client
            .put(Self::internal_url(node, key))
            .timeout(self.timeout)
            .json(version)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                self.record_outcome(node, NodeOutcome::Success);
                true
            }
            Ok(response) => {
                tracing::debug!(node, key, status = %response.status(), "internal put rejected");
                self.record_outcome(node, NodeOutcome::Failure);
                false
            }
            Err(err) if err.is_timeout() => {
                tracing::debug!(node, key, "internal put timed out");
                self.record_outcome(node, NodeOutcome::Timeout);
                false
            }
            Err(err) => {
                tracing::debug!(node, key, error = %err, "internal put failed");
                self.record_outcome(node, NodeOutcome::Failure);
                false
            }
        }
    }

    async fn send_get(&self, node: &str, key: &str) -> Option<Vec<Version>> {
        let result = self
            .client
            .get(Self::internal_url(node, key))
            .timeout(self.timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<VersionsBody>().await {
                    Ok(body) => {
                        self.record_outcome(node, NodeOutcome::Success);
                        Some(body.versions)
                    }
                    Err(err) => {
                        tracing::debug!(node, key, error = %err, "internal get returned bad body");
                        self.record_outcome(node, NodeOutcome::Failure);
                        None
                    }
                }
            }
            Ok(response) => {
                tracing::debug!(node, key, status = %response.status(), "internal get rejected");
                self.record_outcome(node, NodeOutcome::Failure);
                None
            }
            Err(err) if err.is_timeout() => {
                tracing::debug!(node, key, "internal get timed out");
                self.record_outcome(node, NodeOutcome::Timeout);
                None
            }
            Err(err) => {
                tracing::debug!(node, key, error = %err, "internal get failed");
                self.record_outcome(node, NodeOutcome::Failure);
                None
            }
        }
    }
}
