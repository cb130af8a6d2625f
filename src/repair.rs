/// Read repair: the push phase of convergence, triggered on the read path.
///
/// After a read resolves to a latest version set, every replica that
/// participated in the read is checked against it and, if stale or
/// incomplete, sent the latest versions over the internal PUT. The
/// receiving replica appends and compacts, so repaired replicas end up
/// holding exactly the latest set until the next divergence.
///
/// Repair is fire-and-forget: send failures are recorded against the node
/// by the transport, and never fail the client read. Replicas whose read
/// failed at the transport level are skipped; they did not participate and
/// their contents are unknown.
use crate::rpc::ReplicaTransport;
use crate::types::{Causality, Version};
use std::collections::HashMap;

/// Decide whether a replica holding `node_versions` needs the
/// `latest_versions` pushed to it.
fn needs_repair(latest_versions: &[Version], node_versions: &[Version]) -> bool {
    if node_versions.is_empty() {
        return true;
    }

    let all_tombstones = latest_versions.iter().all(Version::is_tombstone);

    if all_tombstones {
        // The key is deleted: the node must hold each winning tombstone
        // and nothing causally older.
        let lacks_tombstone = latest_versions.iter().any(|latest| {
            !node_versions.iter().any(|held| {
                held.is_tombstone()
                    && held.vector_clock.compare(&latest.vector_clock) == Causality::Equal
            })
        });
        let holds_dominated = node_versions.iter().any(|held| {
            latest_versions
                .iter()
                .any(|latest| held.vector_clock.compare(&latest.vector_clock) == Causality::IsDominated)
        });
        return lacks_tombstone || holds_dominated;
    }

    // Live latest over a tombstoned replica: the key was resurrected and
    // the new writes causally dominate the old tombstones.
    if node_versions.iter().any(Version::is_tombstone) {
        return true;
    }

    let holds_dominated = node_versions.iter().any(|held| {
        latest_versions
            .iter()
            .any(|latest| held.vector_clock.compare(&latest.vector_clock) == Causality::IsDominated)
    });
    if holds_dominated {
        return true;
    }

    // The node must hold every latest version, matched by clock.
    latest_versions.iter().any(|latest| {
        !node_versions
            .iter()
            .any(|held| held.vector_clock.compare(&latest.vector_clock) == Causality::Equal)
    })
}

/// Push `latest_versions` to every participating replica that needs them.
/// Returns whether any repair was performed.
pub async fn perform_read_repair(
    key: &str,
    latest_versions: &[Version],
    replica_responses: &HashMap<String, Option<Vec<Version>>>,
    transport: &dyn ReplicaTransport,
) -> bool {
    if latest_versions.is_empty() {
        return false;
    }

    let mut repaired = false;

    for (node, response) in replica_responses {
        let Some(node_versions) = response else {
            continue;
        };

        if !needs_repair(latest_versions, node_versions) {
            continue;
        }

        tracing::debug!(
            node,
            key,
            versions = latest_versions.len(),
            "read repair pushing latest versions"
        );
        repaired = true;

        for latest in latest_versions {
            // Send failures are recorded by the transport; the repair
            // round carries on.
            transport.send_put(node, key, latest).await;
        }
    }

    repaired
}
