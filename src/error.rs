/// Error types for driftkv operations.
///
/// All fallible operations in driftkv return `Result<T, DriftError>`.
/// Transport failures toward individual replicas are deliberately NOT
/// errors: they are absorbed by the quorum logic and only surface as a
/// failed quorum. The variants here cover input validation, configuration,
/// and the node's own serving machinery.
use thiserror::Error;

/// The main error type for driftkv operations.
#[derive(Error, Debug)]
pub enum DriftError {
    /// Quorum parameters failed validation (all must be positive, R <= N, W <= N).
    #[error("Invalid quorum parameters: N={n} R={r} W={w}")]
    InvalidQuorum {
        /// Replication factor requested
        n: usize,
        /// Read quorum requested
        r: usize,
        /// Write quorum requested
        w: usize,
    },

    /// Key failed validation (empty, or longer than the allowed maximum).
    #[error("Invalid key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },

    /// Node identifier is not of the form `host:port`.
    #[error("Invalid node identifier '{given}': expected 'host:port'")]
    InvalidNodeId {
        /// The offending identifier
        given: String,
    },

    /// Serialization error when converting data to/from JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binding or serving the HTTP surface failed.
    #[error("Network error: {0}")]
    Network(String),
}

/// Result type alias for driftkv operations.
pub type DriftResult<T> = Result<T, DriftError>;
