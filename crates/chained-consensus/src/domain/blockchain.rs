//! # Block Chain
//!
//! Per-replica chain state: the forest of proposed blocks, the vote
//! aggregator, the highest known certificate and commit bookkeeping.
//!
//! ## Admission
//!
//! A block enters the forest only after its embedded certificate verifies.
//! The genesis certificate (view 0) is trusted. A certificate that is newer
//! than the current high QC replaces it.
//!
//! ## Votes
//!
//! A vote signs only the block id, so its view is taken on trust. A vote or
//! certificate naming a known block at some other view is refused, and votes
//! more than `vote_view_window` views past the high QC are not tallied.
//!
//! ## Commit
//!
//! Committing a block commits it and every ancestor still above the pruned
//! level, then prunes the forest and the vote tallies up to the committed
//! view. Which block to commit is the caller's decision.

use super::{verify_votes, ChainConfig, ChainError, ChainResult, LevelledForest, Quorum, VoteOutcome};
use crate::metrics;
use serde::Serialize;
use shared_crypto::{CryptoError, SignatureService};
use shared_types::{Block, BlockId, QuorumCertificate, ReplicaId, View, Vote};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Point-in-time counters of a chain.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChainStats {
    pub high_qc_view: View,
    pub lowest_level: View,
    pub highest_committed: View,
    pub committed_blocks: u64,
    pub honest_committed_blocks: u64,
    pub pruned_blocks: u64,
    pub live_blocks: usize,
    pub pending_vote_items: usize,
    pub chain_growth: Option<f64>,
    pub chain_quality: Option<f64>,
}

/// Stateless admission checks on a proposed block: id, parent link, signer
/// count and every certificate signature. Rejections are logged and counted.
pub fn validate_block<S: SignatureService + ?Sized>(
    signer: &S,
    threshold: usize,
    block: &Block,
) -> ChainResult<()> {
    let result = check_block(signer, threshold, block);
    if let Err(e) = &result {
        warn!(block = %block.id, view = block.view, error = %e, "Block rejected");
        metrics::record_block_rejected(e.reason());
    }
    result
}

fn check_block<S: SignatureService + ?Sized>(
    signer: &S,
    threshold: usize,
    block: &Block,
) -> ChainResult<()> {
    if !block.has_valid_id() {
        return Err(ChainError::InvalidBlockId(block.id));
    }
    if block.qc.block_id != block.parent {
        return Err(ChainError::QcParentMismatch {
            block: block.id,
            parent: block.parent,
            certified: block.qc.block_id,
        });
    }
    if block.qc.is_genesis() {
        return Ok(());
    }

    if block.qc.signer_count() < threshold {
        return Err(ChainError::InsufficientSigners {
            block: block.id,
            got: block.qc.signer_count(),
            required: threshold,
        });
    }
    if !signer.verify_quorum_certificate(&block.qc)? {
        return Err(ChainError::InvalidSignature(block.id));
    }
    Ok(())
}

pub struct BlockChain<S: SignatureService> {
    config: ChainConfig,
    signer: Arc<S>,
    forest: LevelledForest<Arc<Block>>,
    quorum: Quorum<S>,
    high_qc: QuorumCertificate,
    highest_committed: View,
    committed_blocks: u64,
    honest_committed_blocks: u64,
    pruned_blocks: u64,
}

impl<S: SignatureService> BlockChain<S> {
    /// Chain of replica `local`, starting from the genesis certificate.
    pub fn new(config: ChainConfig, local: ReplicaId, signer: Arc<S>) -> ChainResult<Self> {
        config.validate()?;
        if !signer.can_sign(&local) {
            return Err(CryptoError::UnknownSigner(local).into());
        }
        let quorum = Quorum::new(local, config.quorum_threshold(), Arc::clone(&signer));
        debug!(
            local = %local,
            n = config.total_nodes,
            f = config.byz_no,
            threshold = quorum.threshold(),
            "Block chain created"
        );

        Ok(Self {
            config,
            signer,
            forest: LevelledForest::new(),
            quorum,
            high_qc: QuorumCertificate::genesis(),
            highest_committed: 0,
            committed_blocks: 0,
            honest_committed_blocks: 0,
            pruned_blocks: 0,
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn local(&self) -> ReplicaId {
        self.quorum.local()
    }

    pub fn signer(&self) -> &Arc<S> {
        &self.signer
    }

    /// Admit a proposed block.
    ///
    /// Returns `Ok(false)` for a block already in the forest.
    pub fn add_block(&mut self, block: Block) -> ChainResult<bool> {
        if self.forest.contains(&block.id) {
            debug!(block = %block.id, view = block.view, "Duplicate block ignored");
            return Ok(false);
        }
        validate_block(&*self.signer, self.quorum.threshold(), &block)?;
        self.add_validated_block(block)
    }

    /// Insert a block that already passed [`validate_block`].
    pub(crate) fn add_validated_block(&mut self, block: Block) -> ChainResult<bool> {
        if self.forest.contains(&block.id) {
            debug!(block = %block.id, view = block.view, "Duplicate block ignored");
            return Ok(false);
        }

        let id = block.id;
        let view = block.view;
        let newer_qc = (block.qc.view > self.high_qc.view).then(|| block.qc.clone());

        if let Err(e) = self.forest.add_vertex(Arc::new(block)) {
            warn!(block = %id, view, error = %e, "Block rejected by forest");
            metrics::record_block_rejected(e.reason());
            return Err(e.into());
        }

        if let Some(qc) = newer_qc {
            self.update_high_qc(qc);
        }

        metrics::record_block_added();
        debug!(block = %id, view, "Block added");
        Ok(true)
    }

    /// Count a vote. The caller feeds a formed certificate to
    /// [`update_high_qc`](Self::update_high_qc).
    pub fn add_vote(&mut self, vote: Vote) -> ChainResult<VoteOutcome> {
        if let Some(outcome) = self.screen_vote(&vote) {
            return Ok(outcome);
        }
        Ok(self.quorum.add_vote(vote)?)
    }

    /// Count a batch of votes, verifying their signatures in parallel.
    pub fn add_votes(&mut self, votes: Vec<Vote>) -> ChainResult<Vec<VoteOutcome>> {
        let verdicts = verify_votes(&*self.signer, &votes);
        self.add_checked_votes(votes.into_iter().zip(verdicts).collect())
    }

    /// Count a vote whose signature verdict is already known.
    pub(crate) fn add_checked_vote(&mut self, vote: Vote, valid: bool) -> ChainResult<VoteOutcome> {
        if let Some(outcome) = self.screen_vote(&vote) {
            return Ok(outcome);
        }
        Ok(self.quorum.add_checked_vote(vote, valid)?)
    }

    pub(crate) fn add_checked_votes(&mut self, votes: Vec<(Vote, bool)>) -> ChainResult<Vec<VoteOutcome>> {
        votes
            .into_iter()
            .map(|(vote, valid)| self.add_checked_vote(vote, valid))
            .collect()
    }

    /// View checks a vote must pass before it reaches the tallies.
    fn screen_vote(&self, vote: &Vote) -> Option<VoteOutcome> {
        if let Some(block) = self.forest.get_vertex(&vote.block_id) {
            if block.view != vote.view {
                warn!(
                    voter = %vote.voter,
                    block = %vote.block_id,
                    claimed = vote.view,
                    actual = block.view,
                    "Vote names a known block at the wrong view"
                );
                metrics::record_vote_rejected("view_mismatch");
                return Some(VoteOutcome::ViewMismatch);
            }
        }

        let horizon = self.high_qc.view.saturating_add(self.config.vote_view_window);
        if vote.view > horizon {
            debug!(voter = %vote.voter, view = vote.view, horizon, "Vote beyond view window");
            metrics::record_vote_rejected("out_of_window");
            return Some(VoteOutcome::OutOfWindow);
        }
        None
    }

    /// Replace the high QC if `qc` is for a strictly higher view.
    ///
    /// A certificate for a known block must carry that block's view.
    pub fn update_high_qc(&mut self, qc: QuorumCertificate) -> bool {
        if qc.view <= self.high_qc.view {
            return false;
        }
        if let Some(block) = self.forest.get_vertex(&qc.block_id) {
            if block.view != qc.view {
                warn!(
                    block = %qc.block_id,
                    claimed = qc.view,
                    actual = block.view,
                    "Certificate names a known block at the wrong view"
                );
                return false;
            }
        }
        debug!(from = self.high_qc.view, to = qc.view, block = %qc.block_id, "High QC advanced");
        metrics::set_high_qc_view(qc.view);
        self.high_qc = qc;
        true
    }

    pub fn high_qc(&self) -> &QuorumCertificate {
        &self.high_qc
    }

    /// Commit `id` and its unpruned ancestors, then prune up to its view.
    ///
    /// Returns the committed blocks, `id` first, then ancestors in
    /// descending view. The walk stops early at a missing parent.
    pub fn commit_block(&mut self, id: &BlockId) -> ChainResult<Vec<Arc<Block>>> {
        let target = self
            .forest
            .get_vertex(id)
            .cloned()
            .ok_or(ChainError::BlockNotFound(*id))?;
        let committed_view = target.view;
        let lowest = self.forest.lowest_level();

        let mut committed = Vec::new();
        let mut honest = 0u64;
        let mut cursor = Some(target);
        while let Some(block) = cursor {
            if block.view <= lowest {
                break;
            }
            if !self.config.is_byzantine(block.proposer) {
                honest += 1;
            }
            cursor = self.forest.get_vertex(&block.parent).cloned();
            committed.push(block);
        }

        let pruned = self.forest.prune_up_to_level(committed_view)?;
        self.quorum.prune_up_to_view(committed_view);

        self.committed_blocks += committed.len() as u64;
        self.honest_committed_blocks += honest;
        self.pruned_blocks += pruned as u64;
        self.highest_committed = committed_view;

        metrics::record_commit(committed.len(), pruned);
        if let Some(quality) = self.chain_quality() {
            metrics::set_chain_quality(quality);
        }
        info!(
            block = %id,
            view = committed_view,
            committed = committed.len(),
            honest,
            pruned,
            "Blocks committed"
        );
        Ok(committed)
    }

    pub fn get_block_by_id(&self, id: &BlockId) -> ChainResult<Arc<Block>> {
        self.forest
            .get_vertex(id)
            .cloned()
            .ok_or(ChainError::BlockNotFound(*id))
    }

    pub fn get_parent_block(&self, id: &BlockId) -> ChainResult<Arc<Block>> {
        let block = self.get_block_by_id(id)?;
        self.forest
            .get_vertex(&block.parent)
            .cloned()
            .ok_or(ChainError::ParentNotFound {
                block: *id,
                parent: block.parent,
            })
    }

    pub fn get_grand_parent_block(&self, id: &BlockId) -> ChainResult<Arc<Block>> {
        let parent = self.get_parent_block(id)?;
        self.get_parent_block(&parent.id)
    }

    /// Children of `id` in arrival order.
    pub fn get_children_blocks(&self, id: &BlockId) -> Vec<Arc<Block>> {
        self.forest.get_children(id).cloned().collect()
    }

    /// First block that arrived for `view`.
    pub fn get_block_by_view(&self, view: View) -> ChainResult<Arc<Block>> {
        self.forest
            .get_vertices_at_level(view)
            .next()
            .cloned()
            .ok_or(ChainError::ViewNotFound(view))
    }

    /// Every block proposed for `view`, in arrival order.
    pub fn get_blocks_at_view(&self, view: View) -> Vec<Arc<Block>> {
        self.forest.get_vertices_at_level(view).cloned().collect()
    }

    pub fn contains_block(&self, id: &BlockId) -> bool {
        self.forest.contains(id)
    }

    /// Honest committed blocks per view up to the highest commit.
    pub fn chain_growth(&self) -> Option<f64> {
        (self.highest_committed > 0)
            .then(|| self.honest_committed_blocks as f64 / self.highest_committed as f64)
    }

    /// Share of committed blocks proposed by honest replicas.
    pub fn chain_quality(&self) -> Option<f64> {
        (self.committed_blocks > 0)
            .then(|| self.honest_committed_blocks as f64 / self.committed_blocks as f64)
    }

    /// Share of pruned blocks that were abandoned forks rather than committed.
    pub fn forking_rate(&self) -> Option<f64> {
        (self.pruned_blocks > 0).then(|| {
            let abandoned = self.pruned_blocks.saturating_sub(self.committed_blocks);
            abandoned as f64 / self.pruned_blocks as f64
        })
    }

    pub fn highest_committed(&self) -> View {
        self.highest_committed
    }

    pub fn committed_blocks(&self) -> u64 {
        self.committed_blocks
    }

    pub fn honest_committed_blocks(&self) -> u64 {
        self.honest_committed_blocks
    }

    pub fn lowest_level(&self) -> View {
        self.forest.lowest_level()
    }

    pub fn quorum(&self) -> &Quorum<S> {
        &self.quorum
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            high_qc_view: self.high_qc.view,
            lowest_level: self.forest.lowest_level(),
            highest_committed: self.highest_committed,
            committed_blocks: self.committed_blocks,
            honest_committed_blocks: self.honest_committed_blocks,
            pruned_blocks: self.pruned_blocks,
            live_blocks: self.forest.len(),
            pending_vote_items: self.quorum.pending_items(),
            chain_growth: self.chain_growth(),
            chain_quality: self.chain_quality(),
        }
    }
}
