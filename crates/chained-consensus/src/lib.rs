//! # chained-consensus
//!
//! Safety core of a chained BFT replica.
//!
//! ## Architecture
//!
//! ```text
//!   transport ──add_block / add_vote / commit_block──→ [ChainHandle]
//!                                                          │ spawn_blocking: verify signatures
//!                                                          │ mpsc
//!                                                          ↓
//!                                                   [ChainService task]
//!                                                          │ write lock
//!                                                          ↓
//!              ┌───────────────────────────── BlockChain ─────────────────┐
//!              │  LevelledForest<Arc<Block>>   Quorum<S>   high QC        │
//!              └──────────────────────────────────────────────────────────┘
//!                                                          │
//!                                                  SignatureService (S)
//! ```
//!
//! - **LevelledForest** stores every unpruned block by id, view and parent.
//! - **Quorum** verifies votes and assembles a quorum certificate when
//!   `ceil((n + f + 1) / 2)` distinct replicas have voted for a block. A
//!   replica's vote counts for at most one block per view.
//! - **BlockChain** admits blocks whose certificate verifies, keeps the
//!   highest certificate, and commits a block with its ancestors before
//!   pruning everything at or below the committed view.
//!
//! Leader rotation, pacemaker timeouts and networking live outside this
//! crate. The caller decides which block to commit.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chained_consensus::{BlockChain, ChainApi, ChainConfig, ChainService};
//! use shared_crypto::KeyStore;
//!
//! let config = ChainConfig::load("chain.json")?;
//! let keys = Arc::new(KeyStore::from_seed_for_replica(
//!     config.signature_scheme, config.replicas(), &seed, local,
//! )?);
//! let (chain, _worker) = ChainService::spawn(BlockChain::new(config, local, keys)?);
//!
//! chain.add_block(block).await?;
//! if let Some(qc) = chain.add_vote(vote).await?.into_quorum_certificate() {
//!     chain.update_high_qc(qc).await?;
//! }
//! ```

pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-export main types
pub use domain::{
    validate_block, verify_vote, verify_votes, BlockChain, ByzantinePolicy, ChainConfig,
    ChainError, ChainResult, ChainStats, ConfigError, ForestError, ForestResult, LevelledForest,
    Quorum, Vertex, VoteKey, VoteOutcome,
};
pub use ports::{ChainApi, SignatureService};
pub use service::{ChainCommand, ChainHandle, ChainService};
