//! # driftkv
//!
//! A replicated, eventually-consistent key-value store organized as a peer
//! cluster of equal nodes. Any node accepts reads, writes, and deletes for
//! any key; internally every operation is coordinated across the replicas
//! chosen by consistent hashing, combined under vector-clock causality,
//! and completed subject to configurable read and write quorums.
//!
//! driftkv is deliberately AP-leaning: it prefers returning partial
//! results and divergent sibling versions over refusing service while some
//! replicas are unreachable. Divergence created under partition is
//! reconciled opportunistically by read repair.
//!
//! ## Architecture
//!
//! - [`HashRing`] maps each key to an ordered preference list of replicas
//!   via consistent hashing with virtual nodes.
//! - [`VectorClock`] captures per-key causality; [`resolve_versions`]
//!   reduces a multiset of versions to the causally maximal siblings.
//! - [`Coordinator`] orchestrates PUT / GET / DELETE across replicas:
//!   context gather, clock derivation, parallel dispatch, quorum
//!   evaluation, tombstone visibility, and read repair.
//! - [`MemoryStorage`] holds each key's append-only sibling multiset.
//! - [`FailureDetector`] accumulates per-node health signals; [`Metrics`]
//!   tracks latencies, quorum rates, and conflicts.
//!
//! Deletes are tombstones: versions with `deleted: true` that replicate,
//! merge, and quorum exactly like live writes, so a delete can lose to a
//! causally later write and a deleted key can be resurrected.
//!
//! ## Running a node
//!
//! ```ignore
//! use driftkv::{Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = NodeConfig::new("127.0.0.1:5001").nodes(vec![
//!         "127.0.0.1:5001".to_string(),
//!         "127.0.0.1:5002".to_string(),
//!         "127.0.0.1:5003".to_string(),
//!     ]);
//!     Node::new(config)?.serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! The HTTP surface is `PUT/GET/DELETE /kv/{key}` for clients (with
//! optional per-request `N`/`R`/`W`), `PUT/GET /internal/kv/{key}` between
//! nodes, and `GET /metrics` / `GET /status` for observability.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod failure;
pub mod http;
pub mod metrics;
pub mod node;
pub mod quorum;
pub mod repair;
pub mod replication;
pub mod resolve;
pub mod ring;
pub mod rpc;
pub mod storage;
pub mod types;

pub use config::{ReplicaSettings, DEFAULT_N, DEFAULT_R, DEFAULT_W};
pub use coordinator::Coordinator;
pub use error::{DriftError, DriftResult};
pub use failure::{FailureDetector, FailureKind};
pub use metrics::Metrics;
pub use node::{Node, NodeConfig};
pub use resolve::resolve_versions;
pub use ring::HashRing;
pub use storage::MemoryStorage;
pub use types::{Causality, Version, VectorClock};
