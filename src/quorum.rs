/// Quorum evaluation for read and write operations.
///
/// The concurrency layer produces a replica -> response map within the
/// timeout budget; these helpers only count. A write response is the
/// replica's acknowledgement; a read response is `Some(versions)` for a
/// responding replica (an empty list IS a response: the replica answered
/// and holds nothing) and `None` for a transport failure.
use crate::types::Version;
use std::collections::HashMap;

/// True iff at least `w` replicas acknowledged the write.
pub fn write_quorum_met(responses: &HashMap<String, bool>, w: usize) -> bool {
    responses.values().filter(|ok| **ok).count() >= w
}

/// Collect a read quorum: flatten every responding replica's versions and
/// report whether at least `r` replicas responded.
pub fn collect_read_quorum(
    responses: &HashMap<String, Option<Vec<Version>>>,
    r: usize,
) -> (Vec<Version>, bool) {
    let mut all_versions = Vec::new();
    let mut responding = 0usize;

    for response in responses.values() {
        if let Some(versions) = response {
            responding += 1;
            all_versions.extend(versions.iter().cloned());
        }
    }

    (all_versions, responding >= r)
}
