//! Driving ports (inbound API)

use crate::domain::{ChainError, ChainStats, VoteOutcome};
use async_trait::async_trait;
use shared_types::{Block, BlockId, QuorumCertificate, View, Vote};
use std::sync::Arc;

/// Entry points the transport layer uses to drive a replica's chain.
///
/// Mutations are applied one at a time in the order they are accepted.
/// Reads observe every mutation whose call has returned.
#[async_trait]
pub trait ChainApi: Send + Sync {
    /// Admit a proposed block. `Ok(false)` for a duplicate.
    async fn add_block(&self, block: Block) -> Result<bool, ChainError>;

    /// Count a vote.
    async fn add_vote(&self, vote: Vote) -> Result<VoteOutcome, ChainError>;

    /// Count a batch of votes.
    async fn add_votes(&self, votes: Vec<Vote>) -> Result<Vec<VoteOutcome>, ChainError>;

    /// Replace the high QC if `qc` is newer.
    async fn update_high_qc(&self, qc: QuorumCertificate) -> Result<bool, ChainError>;

    /// Commit a block and its unpruned ancestors.
    async fn commit_block(&self, id: BlockId) -> Result<Vec<Arc<Block>>, ChainError>;

    /// Highest known quorum certificate.
    fn high_qc(&self) -> QuorumCertificate;

    fn get_block_by_id(&self, id: &BlockId) -> Result<Arc<Block>, ChainError>;

    fn get_parent_block(&self, id: &BlockId) -> Result<Arc<Block>, ChainError>;

    fn get_grand_parent_block(&self, id: &BlockId) -> Result<Arc<Block>, ChainError>;

    fn get_children_blocks(&self, id: &BlockId) -> Vec<Arc<Block>>;

    fn get_block_by_view(&self, view: View) -> Result<Arc<Block>, ChainError>;

    fn stats(&self) -> ChainStats;
}
