//! Error types for arbor operations

use crate::{AuthorId, NodeId, TreeId};
use thiserror::Error;

/// Tree structure errors. All are raised before any write happens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Invalid parent {parent_id} for tree {tree_id}: {reason}")]
    InvalidParent {
        parent_id: NodeId,
        tree_id: TreeId,
        reason: String,
    },

    #[error("Cycle detected: moving {node_id} under {new_parent_id} would make it its own ancestor")]
    CycleDetected {
        node_id: NodeId,
        new_parent_id: NodeId,
    },

    #[error("Node {node_id} has {child_count} children and cascade was not requested")]
    NodeHasChildren { node_id: NodeId, child_count: usize },

    #[error("Node not found: {id}")]
    NodeNotFound { id: NodeId },

    #[error("Node {id} is not a comment")]
    NotAComment { id: NodeId },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Storage backend failed: {reason}")]
    Backend { reason: String },
}

/// Cache backend errors. The cache layer degrades these to misses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Snapshot serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Snapshot deserialization failed: {reason}")]
    Deserialization { reason: String },

    #[error("Invalid cache key: {key}")]
    InvalidKey { key: String },
}

/// Dynamic child resolver errors. Never fatal to a read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("No resolver registered under {name}")]
    NotRegistered { name: String },

    #[error("Resolver {name} is disabled")]
    Disabled { name: String },

    #[error("Resolver {resolver} collaborator failed: {reason}")]
    CollaboratorFailed { resolver: String, reason: String },
}

/// Author trust state errors. Never block an approval.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrustError {
    #[error("Trust query failed for author {author_id}: {reason}")]
    QueryFailed { author_id: AuthorId, reason: String },

    #[error("Trust write failed for author {author_id}: {reason}")]
    WriteFailed { author_id: AuthorId, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Failed to read configuration file {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Master error type for all arbor errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArborError {
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Trust error: {0}")]
    Trust(#[from] TrustError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for arbor operations.
pub type ArborResult<T> = Result<T, ArborError>;

// =============================================================================
// TESTS
// =============================================================================
