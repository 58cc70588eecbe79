//! Error types for the chained consensus core

use shared_crypto::CryptoError;
use shared_types::{BlockId, View};

/// Structural errors raised by the levelled forest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForestError {
    #[error("Vertex {vertex:?} at level {level} is at or below pruned level {lowest}")]
    BelowPrunedLevel {
        vertex: BlockId,
        level: u64,
        lowest: u64,
    },

    #[error("Vertex {vertex:?} at level {level} claims parent level {parent_level}")]
    InvalidParentLevel {
        vertex: BlockId,
        level: u64,
        parent_level: u64,
    },

    #[error("Unknown parent {parent:?} at level {parent_level} for vertex {vertex:?}")]
    UnknownParent {
        vertex: BlockId,
        parent: BlockId,
        parent_level: u64,
    },

    #[error("Cannot prune to level {requested}: already pruned up to {lowest}")]
    AlreadyPruned { requested: u64, lowest: u64 },
}

impl ForestError {
    /// Short label used for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::BelowPrunedLevel { .. } => "below_pruned_level",
            Self::InvalidParentLevel { .. } => "invalid_parent_level",
            Self::UnknownParent { .. } => "unknown_parent",
            Self::AlreadyPruned { .. } => "already_pruned",
        }
    }
}

/// Result type for forest operations
pub type ForestResult<T> = Result<T, ForestError>;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Replica set is empty")]
    NoReplicas,

    #[error("{total_nodes} replicas cannot tolerate {byz_no} faults (need n >= 3f + 1)")]
    InvalidFaultBound { total_nodes: usize, byz_no: usize },

    #[error("Channel buffer size must be positive")]
    ZeroBufferSize,

    #[error("Vote view window must be positive")]
    ZeroVoteWindow,
}

/// Errors surfaced by the block chain and its service.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Block not found: {0:?}")]
    BlockNotFound(BlockId),

    #[error("Parent {parent:?} of block {block:?} not found")]
    ParentNotFound { block: BlockId, parent: BlockId },

    #[error("No block at view {0}")]
    ViewNotFound(View),

    #[error("Block {0:?} does not hash to its identifier")]
    InvalidBlockId(BlockId),

    #[error("Invalid quorum certificate signature in block {0:?}")]
    InvalidSignature(BlockId),

    #[error("Block {block:?} carries {got} signers, quorum requires {required}")]
    InsufficientSigners {
        block: BlockId,
        got: usize,
        required: usize,
    },

    #[error("Block {block:?} names parent {parent:?} but its QC certifies {certified:?}")]
    QcParentMismatch {
        block: BlockId,
        parent: BlockId,
        certified: BlockId,
    },

    #[error("Forest error: {0}")]
    Forest(#[from] ForestError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chain service is closed")]
    ServiceClosed,

    #[error("Signature verification task did not complete")]
    VerificationAborted,
}

impl ChainError {
    /// Short label used for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::BlockNotFound(_) => "block_not_found",
            Self::ParentNotFound { .. } => "parent_not_found",
            Self::ViewNotFound(_) => "view_not_found",
            Self::InvalidBlockId(_) => "invalid_block_id",
            Self::InvalidSignature(_) => "invalid_qc",
            Self::InsufficientSigners { .. } => "insufficient_signers",
            Self::QcParentMismatch { .. } => "qc_parent_mismatch",
            Self::Forest(e) => e.reason(),
            Self::Crypto(_) => "crypto",
            Self::Config(_) => "config",
            Self::ServiceClosed => "service_closed",
            Self::VerificationAborted => "verification_aborted",
        }
    }
}

/// Result type for chain operations
pub type ChainResult<T> = Result<T, ChainError>;
