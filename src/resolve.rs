/// Conflict resolution over a key's sibling versions.
///
/// Reads gather version multisets from several replicas; this module
/// reduces such a multiset to the causally maximal survivors. A version
/// survives unless some other version in the set strictly dominates it.
/// Concurrent versions all survive, as siblings, and the client decides
/// what to do with them. Equal versions with equal values collapse to one;
/// equal clocks with differing values stay as siblings, preserving the
/// divergence for the client to see.
use crate::types::{Causality, Version};

/// Drop duplicate versions, keeping the first occurrence of each
/// (value, vector clock) pair.
pub fn deduplicate_versions(versions: Vec<Version>) -> Vec<Version> {
    let mut unique: Vec<Version> = Vec::with_capacity(versions.len());

    for version in versions {
        if !unique.iter().any(|kept| kept.is_duplicate_of(&version)) {
            unique.push(version);
        }
    }

    unique
}

/// Reduce a multiset of versions to its causally maximal survivors.
///
/// A version survives iff no other version in the input strictly dominates
/// it. The result is deduplicated, order-preserving on first occurrence.
pub fn resolve_versions(versions: &[Version]) -> Vec<Version> {
    let mut survivors: Vec<Version> = Vec::new();

    for (i, version) in versions.iter().enumerate() {
        let dominated = versions.iter().enumerate().any(|(j, other)| {
            i != j && version.vector_clock.compare(&other.vector_clock) == Causality::IsDominated
        });
        if !dominated {
            survivors.push(version.clone());
        }
    }

    deduplicate_versions(survivors)
}
