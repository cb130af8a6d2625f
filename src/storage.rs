/// In-memory multi-version key-value store.
///
/// Each key maps to an unordered multiset of sibling versions, tombstones
/// included. Writes append and never overwrite; read-time filtering to
/// live versions is the coordinator's job, never the store's. The store is
/// thread-safe via DashMap, and every read hands back a snapshot copy that
/// is safe to iterate without holding any lock.
use crate::types::Version;
use dashmap::DashMap;

/// Thread-safe multi-version store for a single node.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, Vec<Version>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Append a version to the key's sibling list. Never overwrites.
    pub fn put(&self, key: &str, version: Version) {
        self.entries.entry(key.to_string()).or_default().push(version);
    }

    /// Snapshot of the key's versions. Same contents as [`MemoryStorage::get_all`];
    /// tombstones are never hidden from internal callers.
    pub fn get(&self, key: &str) -> Vec<Version> {
        self.get_all(key)
    }

    /// Snapshot of ALL versions for the key, tombstones included.
    pub fn get_all(&self, key: &str) -> Vec<Version> {
        self.entries
            .get(key)
            .map(|versions| versions.clone())
            .unwrap_or_default()
    }

    /// Replace the key's sibling list atomically. Used by compaction.
    pub fn overwrite(&self, key: &str, versions: Vec<Version>) {
        self.entries.insert(key.to_string(), versions);
    }

    /// Remove the key entirely. Admin/GC only; normal deletes write
    /// tombstones through the coordinator.
    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Number of keys currently present (tombstoned keys included).
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// All keys currently present, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Total number of stored versions across all keys.
    pub fn version_count(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VectorClock;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn version(value: serde_json::Value, node: &str, counter: u64) -> Version {
        Version::live(value, VectorClock::from([(node, counter)]))
    }

    #[test]
    fn test_put_appends() {
        let storage = MemoryStorage::new();
        storage.put("k", version(json!(1), "a:1", 1));
        storage.put("k", version(json!(2), "b:1", 1));

        let versions = storage.get_all("k");
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].value, json!(1));
        assert_eq!(versions[1].value, json!(2));
    }

    #[test]
    fn test_replayed_put_keeps_duplicates() {
        let storage = MemoryStorage::new();
        let v = version(json!("same"), "a:1", 1);
        for _ in 0..5 {
            storage.put("k", v.clone());
        }
        // Append-only: the store itself never deduplicates.
        assert_eq!(storage.get_all("k").len(), 5);
        assert_eq!(crate::resolve::resolve_versions(&storage.get_all("k")).len(), 1);
    }

    #[test]
    fn test_missing_key_is_empty() {
        let storage = MemoryStorage::new();
        assert!(storage.get("absent").is_empty());
        assert!(storage.get_all("absent").is_empty());
    }

    #[test]
    fn test_get_includes_tombstones() {
        let storage = MemoryStorage::new();
        storage.put("k", version(json!("x"), "a:1", 1));
        storage.put("k", Version::tombstone(VectorClock::from([("a:1", 2)])));

        let all = storage.get_all("k");
        assert_eq!(all.len(), 2);
        assert!(all[1].is_tombstone());
        // get() exposes the same snapshot.
        assert_eq!(storage.get("k"), all);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let storage = MemoryStorage::new();
        storage.put("k", version(json!(1), "a:1", 1));

        let snapshot = storage.get_all("k");
        storage.put("k", version(json!(2), "a:1", 2));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(storage.get_all("k").len(), 2);
    }

    #[test]
    fn test_overwrite_replaces_siblings() {
        let storage = MemoryStorage::new();
        storage.put("k", version(json!(1), "a:1", 1));
        storage.put("k", version(json!(2), "a:1", 2));

        let survivor = version(json!(2), "a:1", 2);
        storage.overwrite("k", vec![survivor.clone()]);
        assert_eq!(storage.get_all("k"), vec![survivor]);
    }

    #[test]
    fn test_delete_removes_key() {
        let storage = MemoryStorage::new();
        storage.put("k", version(json!(1), "a:1", 1));
        storage.delete("k");
        assert!(storage.get_all("k").is_empty());
        assert_eq!(storage.key_count(), 0);
    }

    #[test]
    fn test_key_count_and_keys() {
        let storage = MemoryStorage::new();
        storage.put("b", version(json!(1), "a:1", 1));
        storage.put("a", version(json!(1), "a:1", 1));
        storage.put("a", version(json!(2), "a:1", 2));

        assert_eq!(storage.key_count(), 2);
        assert_eq!(storage.keys(), vec!["a", "b"]);
        assert_eq!(storage.version_count(), 3);
    }

    #[test]
    fn test_concurrent_appends_same_key() {
        let storage = Arc::new(MemoryStorage::new());
        let mut handles = vec![];

        for i in 0..20 {
            let storage = Arc::clone(&storage);
            handles.push(thread::spawn(move || {
                storage.put("counter", version(json!(i), "a:1", i as u64 + 1));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.get_all("counter").len(), 20);
    }

    #[test]
    fn test_concurrent_writes_distinct_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let mut handles = vec![];

        for i in 0..10 {
            let storage = Arc::clone(&storage);
            handles.push(thread::spawn(move || {
                storage.put(&format!("key{}", i), version(json!(i), "a:1", 1));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.key_count(), 10);
    }
}
