/// Multi-node integration tests over the real HTTP surface.
///
/// Each test builds a three-node cluster on loopback: listeners are bound
/// on port 0 first so the static ring membership can name every address,
/// then each node serves on its pre-bound listener. Clients and replicas
/// both go through actual HTTP.
use driftkv::{Node, NodeConfig};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;

struct TestCluster {
    nodes: Vec<String>,
    client: reqwest::Client,
}

impl TestCluster {
    /// Bind `count` listeners, fix the membership, and serve every node.
    async fn start(count: usize) -> Self {
        let mut listeners = Vec::new();
        for _ in 0..count {
            listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
        }

        let nodes: Vec<String> = listeners
            .iter()
            .map(|l| format!("127.0.0.1:{}", l.local_addr().unwrap().port()))
            .collect();

        for (listener, node_id) in listeners.into_iter().zip(nodes.iter()) {
            let config = NodeConfig::new(node_id.clone()).nodes(nodes.clone());
            let node = Node::new(config).unwrap();
            tokio::spawn(node.serve_on(listener));
        }

        let cluster = Self {
            nodes,
            client: reqwest::Client::new(),
        };
        cluster.wait_ready().await;
        cluster
    }

    /// Like `start`, but only the first `serving` nodes actually run; the
    /// rest stay unreachable while still being ring members.
    async fn start_partial(count: usize, serving: usize) -> Self {
        let mut listeners = Vec::new();
        for _ in 0..count {
            listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
        }

        let nodes: Vec<String> = listeners
            .iter()
            .map(|l| format!("127.0.0.1:{}", l.local_addr().unwrap().port()))
            .collect();

        for (i, (listener, node_id)) in listeners.into_iter().zip(nodes.iter()).enumerate() {
            if i >= serving {
                drop(listener);
                continue;
            }
            let config = NodeConfig::new(node_id.clone()).nodes(nodes.clone());
            let node = Node::new(config).unwrap();
            tokio::spawn(node.serve_on(listener));
        }

        let cluster = Self {
            nodes,
            client: reqwest::Client::new(),
        };
        for node in &cluster.nodes[..serving] {
            cluster.wait_node_ready(node).await;
        }
        cluster
    }

    async fn wait_ready(&self) {
        for node in &self.nodes {
            self.wait_node_ready(node).await;
        }
    }

    async fn wait_node_ready(&self, node: &str) {
        for _ in 0..50 {
            if self
                .client
                .get(format!("http://{}/status", node))
                .send()
                .await
                .is_ok()
            {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("node {} never became ready", node);
    }

    fn id(&self, i: usize) -> &str {
        &self.nodes[i]
    }

    async fn put(&self, i: usize, key: &str, body: JsonValue) -> (u16, JsonValue) {
        let response = self
            .client
            .put(format!("http://{}/kv/{}", self.nodes[i], key))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn get(&self, i: usize, key: &str) -> Vec<JsonValue> {
        let response = self
            .client
            .get(format!("http://{}/kv/{}", self.nodes[i], key))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: JsonValue = response.json().await.unwrap();
        body["versions"].as_array().cloned().unwrap()
    }

    async fn delete(&self, i: usize, key: &str) -> (u16, JsonValue) {
        let response = self
            .client
            .delete(format!("http://{}/kv/{}", self.nodes[i], key))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn internal_put(&self, i: usize, key: &str, version: JsonValue) {
        let response = self
            .client
            .put(format!("http://{}/internal/kv/{}", self.nodes[i], key))
            .json(&version)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    async fn internal_get(&self, i: usize, key: &str) -> Vec<JsonValue> {
        let response = self
            .client
            .get(format!("http://{}/internal/kv/{}", self.nodes[i], key))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: JsonValue = response.json().await.unwrap();
        body["versions"].as_array().cloned().unwrap()
    }
}

#[tokio::test]
async fn test_basic_write_read() {
    let cluster = TestCluster::start(3).await;

    let (status, body) = cluster.put(0, "k1", json!({"value": "alpha"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));

    let versions = cluster.get(0, "k1").await;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0]["value"], json!("alpha"));
    assert_eq!(
        versions[0]["vector_clock"],
        json!({ cluster.id(0): 1 })
    );
}

#[tokio::test]
async fn test_read_from_any_coordinator() {
    let cluster = TestCluster::start(3).await;
    cluster.put(0, "shared", json!({"value": 42})).await;

    for i in 0..3 {
        let versions = cluster.get(i, "shared").await;
        assert_eq!(versions.len(), 1, "coordinator {} disagrees", i);
        assert_eq!(versions[0]["value"], json!(42));
    }
}

#[tokio::test]
async fn test_concurrent_writers_yield_siblings() {
    let cluster = TestCluster::start(3).await;

    // Two writes that never observed each other, injected at every
    // replica through the internal surface.
    let left = json!({"value": "x", "vector_clock": { cluster.id(0): 1 }});
    let right = json!({"value": "y", "vector_clock": { cluster.id(1): 1 }});
    for i in 0..3 {
        cluster.internal_put(i, "k", left.clone()).await;
        cluster.internal_put(i, "k", right.clone()).await;
    }

    let versions = cluster.get(2, "k").await;
    assert_eq!(versions.len(), 2);
    let mut values: Vec<&str> = versions
        .iter()
        .map(|v| v["value"].as_str().unwrap())
        .collect();
    values.sort();
    assert_eq!(values, vec!["x", "y"]);
}

#[tokio::test]
async fn test_causal_overwrite_collapses_siblings() {
    let cluster = TestCluster::start(3).await;

    let left = json!({"value": "x", "vector_clock": { cluster.id(0): 1 }});
    let right = json!({"value": "y", "vector_clock": { cluster.id(1): 1 }});
    for i in 0..3 {
        cluster.internal_put(i, "k", left.clone()).await;
        cluster.internal_put(i, "k", right.clone()).await;
    }
    assert_eq!(cluster.get(2, "k").await.len(), 2);

    // The coordinator gathers both siblings as context, so the new write
    // dominates them.
    let (status, _) = cluster.put(2, "k", json!({"value": "z"})).await;
    assert_eq!(status, 200);

    let versions = cluster.get(0, "k").await;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0]["value"], json!("z"));
    assert_eq!(
        versions[0]["vector_clock"],
        json!({ cluster.id(0): 1, cluster.id(1): 1, cluster.id(2): 1 })
    );
}

#[tokio::test]
async fn test_tombstone_wins() {
    let cluster = TestCluster::start(3).await;

    cluster.put(0, "k", json!({"value": "x"})).await;
    let (status, body) = cluster.delete(0, "k").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));

    // Deleted keys read as absent.
    assert!(cluster.get(1, "k").await.is_empty());

    // Every replica holds exactly the winning tombstone.
    for i in 0..3 {
        let held = cluster.internal_get(i, "k").await;
        assert_eq!(held.len(), 1, "replica {} holds {:?}", i, held);
        assert_eq!(held[0]["deleted"], json!(true));
        assert_eq!(held[0]["value"], JsonValue::Null);
        assert_eq!(held[0]["vector_clock"], json!({ cluster.id(0): 2 }));
    }
}

#[tokio::test]
async fn test_resurrection_after_delete() {
    let cluster = TestCluster::start(3).await;

    cluster.put(0, "k", json!({"value": "x"})).await;
    cluster.delete(0, "k").await;

    // A later write reads the tombstone as context and dominates it.
    let (status, _) = cluster.put(1, "k", json!({"value": "w"})).await;
    assert_eq!(status, 200);

    let versions = cluster.get(2, "k").await;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0]["value"], json!("w"));
    assert_eq!(
        versions[0]["vector_clock"],
        json!({ cluster.id(0): 2, cluster.id(1): 1 })
    );

    // The tombstones are gone from every replica.
    for i in 0..3 {
        let held = cluster.internal_get(i, "k").await;
        assert_eq!(held.len(), 1);
        assert!(held[0].get("deleted").is_none());
    }
}

#[tokio::test]
async fn test_quorum_miss_with_two_nodes_down() {
    let cluster = TestCluster::start_partial(3, 1).await;

    // W=2 cannot be met with only the coordinator up.
    let (status, body) = cluster.put(0, "k", json!({"value": "v"})).await;
    assert_eq!(status, 503);
    assert_eq!(body["success"], json!(false));

    // The local replica still accepted the write.
    let held = cluster.internal_get(0, "k").await;
    assert_eq!(held.len(), 1);
    assert_eq!(held[0]["value"], json!("v"));

    // R=2 cannot be met either: the read comes back empty.
    assert!(cluster.get(0, "k").await.is_empty());
}

#[tokio::test]
async fn test_read_repair_refills_wiped_replica() {
    let cluster = TestCluster::start(3).await;
    cluster.put(0, "k", json!({"value": "v"})).await;

    // Find a replica and overwrite it with a stale state by injecting an
    // older clock at a fresh key, then reading through a quorum.
    let stale = json!({"value": "old", "vector_clock": { cluster.id(0): 1 }});
    let fresh = json!({"value": "new", "vector_clock": { cluster.id(0): 2 }});
    cluster.internal_put(0, "repairable", stale.clone()).await;
    cluster.internal_put(1, "repairable", fresh.clone()).await;
    cluster.internal_put(2, "repairable", fresh.clone()).await;

    let versions = cluster.get(1, "repairable").await;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0]["value"], json!("new"));

    // The stale replica catches up shortly after the read returns.
    let mut repaired = false;
    for _ in 0..50 {
        let held = cluster.internal_get(0, "repairable").await;
        if held.len() == 1 && held[0]["value"] == json!("new") {
            repaired = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(repaired, "replica 0 was never repaired");
}

#[tokio::test]
async fn test_sibling_read_repair_spreads_all_versions() {
    let cluster = TestCluster::start(3).await;

    // Replica 0 only knows one sibling; the others know both.
    let left = json!({"value": "x", "vector_clock": { cluster.id(0): 1 }});
    let right = json!({"value": "y", "vector_clock": { cluster.id(1): 1 }});
    cluster.internal_put(0, "k", left.clone()).await;
    for i in 1..3 {
        cluster.internal_put(i, "k", left.clone()).await;
        cluster.internal_put(i, "k", right.clone()).await;
    }

    let versions = cluster.get(1, "k").await;
    assert_eq!(versions.len(), 2);

    let mut converged = false;
    for _ in 0..50 {
        if cluster.internal_get(0, "k").await.len() == 2 {
            converged = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(converged, "replica 0 never received the missing sibling");
}

#[tokio::test]
async fn test_metrics_reflect_traffic() {
    let cluster = TestCluster::start(3).await;
    cluster.put(0, "m1", json!({"value": 1})).await;
    cluster.put(0, "m2", json!({"value": 2})).await;
    cluster.get(0, "m1").await;

    let client = reqwest::Client::new();
    let metrics: JsonValue = client
        .get(format!("http://{}/metrics", cluster.id(0)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(metrics["operations"]["writes"], json!(2));
    assert_eq!(metrics["operations"]["reads"], json!(1));
    assert_eq!(metrics["quorum_rates"]["write_success_rate"], json!(1.0));
}

#[tokio::test]
async fn test_per_request_quorum_overrides() {
    let cluster = TestCluster::start(3).await;

    let (status, body) = cluster
        .put(0, "k", json!({"value": "v", "N": 1, "W": 1}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));

    // R=1 reads succeed against a single replica.
    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/kv/k?R=1&N=1", cluster.id(0)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}
