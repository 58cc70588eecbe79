//! # Vote Aggregation
//!
//! Collects signed votes per `(view, block)` and assembles a quorum
//! certificate the first time `threshold` distinct replicas have voted.
//!
//! Signatures are verified before a vote counts. A replica's second vote for
//! the same item is ignored, whether or not a certificate already exists.
//! Votes arriving after certification are recorded but never produce a
//! second certificate.
//!
//! A replica votes for at most one block per view. A vote for a different
//! block at a view the replica already voted in is reported as equivocation
//! and opens no tally, so each replica holds at most one tally per view.
//!
//! [`verify_vote`] and [`verify_votes`] need only the signature service. The
//! chain service runs them before taking the chain lock and hands the
//! verdicts to the aggregator.

use crate::metrics;
use shared_crypto::{CryptoResult, SignatureService, VerificationRequest};
use shared_types::{quorum_certificate_id, BlockId, QuorumCertificate, ReplicaId, Signature, View, Vote};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Item a vote endorses.
///
/// Ordered by view first so every tally at or below a view is one
/// contiguous range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoteKey {
    pub view: View,
    pub block_id: BlockId,
}

impl VoteKey {
    pub fn new(view: View, block_id: BlockId) -> Self {
        Self { view, block_id }
    }

    fn of(vote: &Vote) -> Self {
        Self::new(vote.view, vote.block_id)
    }
}

/// What happened to a submitted vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Counted; no certificate resulted
    Recorded,
    /// Counted, and it completed the quorum
    QuorumFormed(QuorumCertificate),
    /// The signer already voted for this item
    Duplicate,
    /// The view is already pruned
    Stale,
    /// The signature did not verify
    InvalidSignature,
    /// The voter already voted for another block at this view
    Equivocation,
    /// The block is known at a different view than the vote claims
    ViewMismatch,
    /// The view is too far ahead of the highest certificate
    OutOfWindow,
}

impl VoteOutcome {
    /// The certificate formed by this vote, if any.
    pub fn quorum_certificate(&self) -> Option<&QuorumCertificate> {
        match self {
            Self::QuorumFormed(qc) => Some(qc),
            _ => None,
        }
    }

    pub fn into_quorum_certificate(self) -> Option<QuorumCertificate> {
        match self {
            Self::QuorumFormed(qc) => Some(qc),
            _ => None,
        }
    }

    pub fn is_quorum_formed(&self) -> bool {
        matches!(self, Self::QuorumFormed(_))
    }

    /// Whether the vote now counts towards its item.
    pub fn is_counted(&self) -> bool {
        matches!(self, Self::Recorded | Self::QuorumFormed(_))
    }
}

/// Verify the signature of a vote. Failures are logged and counted.
pub fn verify_vote<S: SignatureService + ?Sized>(signer: &S, vote: &Vote) -> bool {
    let verdict = signer.verify(&vote.signature, &vote.signing_message(), vote.voter);
    accept_verdict(vote, verdict)
}

/// Verify many votes in parallel. Verdicts keep the input order.
pub fn verify_votes<S: SignatureService + ?Sized>(signer: &S, votes: &[Vote]) -> Vec<bool> {
    let requests: Vec<VerificationRequest> = votes
        .iter()
        .map(|vote| VerificationRequest {
            signer: vote.voter,
            message: vote.signing_message(),
            signature: vote.signature.clone(),
        })
        .collect();

    signer
        .verify_batch(&requests)
        .into_iter()
        .zip(votes)
        .map(|(verdict, vote)| accept_verdict(vote, verdict))
        .collect()
}

fn accept_verdict(vote: &Vote, verdict: CryptoResult<bool>) -> bool {
    match verdict {
        Ok(true) => true,
        Ok(false) => {
            warn!(voter = %vote.voter, view = vote.view, "Vote signature mismatch");
            metrics::record_vote_rejected("invalid_signature");
            false
        }
        Err(e) => {
            warn!(voter = %vote.voter, view = vote.view, error = %e, "Vote signature unverifiable");
            metrics::record_vote_rejected("malformed");
            false
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    /// Signatures by signer; the map keeps signers sorted
    votes: BTreeMap<ReplicaId, Signature>,
    certified: bool,
}

/// Vote aggregator of one replica.
pub struct Quorum<S: SignatureService> {
    /// Replica that signs the certificates it assembles
    local: ReplicaId,
    threshold: usize,
    signer: Arc<S>,
    tallies: BTreeMap<VoteKey, Tally>,
    /// Block each replica voted for, per view
    ballots: BTreeMap<(View, ReplicaId), BlockId>,
    pruned_view: View,
}

impl<S: SignatureService> Quorum<S> {
    pub fn new(local: ReplicaId, threshold: usize, signer: Arc<S>) -> Self {
        Self {
            local,
            threshold,
            signer,
            tallies: BTreeMap::new(),
            ballots: BTreeMap::new(),
            pruned_view: 0,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn local(&self) -> ReplicaId {
        self.local
    }

    /// Highest view whose tallies were discarded.
    pub fn pruned_view(&self) -> View {
        self.pruned_view
    }

    /// Verify and count a vote.
    ///
    /// Errors only when a certificate is due and the local replica cannot
    /// sign it. Bad votes are reported through the outcome.
    pub fn add_vote(&mut self, vote: Vote) -> CryptoResult<VoteOutcome> {
        if let Some(outcome) = self.screen(&vote) {
            return Ok(outcome);
        }
        if !verify_vote(&*self.signer, &vote) {
            return Ok(VoteOutcome::InvalidSignature);
        }
        self.record_verified(vote)
    }

    /// Verify a batch of votes in parallel, then count them in input order.
    pub fn add_votes(&mut self, votes: Vec<Vote>) -> CryptoResult<Vec<VoteOutcome>> {
        let verdicts = verify_votes(&*self.signer, &votes);
        votes
            .into_iter()
            .zip(verdicts)
            .map(|(vote, valid)| self.add_checked_vote(vote, valid))
            .collect()
    }

    /// Count a vote whose signature was already checked; `valid` is the
    /// verdict of [`verify_vote`].
    pub(crate) fn add_checked_vote(&mut self, vote: Vote, valid: bool) -> CryptoResult<VoteOutcome> {
        if let Some(outcome) = self.screen(&vote) {
            return Ok(outcome);
        }
        if !valid {
            return Ok(VoteOutcome::InvalidSignature);
        }
        self.record_verified(vote)
    }

    /// Number of distinct signers recorded for an item.
    pub fn vote_count(&self, view: View, block_id: &BlockId) -> usize {
        self.tallies
            .get(&VoteKey::new(view, *block_id))
            .map_or(0, |tally| tally.votes.len())
    }

    pub fn is_certified(&self, view: View, block_id: &BlockId) -> bool {
        self.tallies
            .get(&VoteKey::new(view, *block_id))
            .is_some_and(|tally| tally.certified)
    }

    /// Items that have votes but no certificate yet.
    pub fn pending_items(&self) -> usize {
        self.tallies.values().filter(|tally| !tally.certified).count()
    }

    /// Items with at least one recorded vote, certified or not.
    pub fn tally_count(&self) -> usize {
        self.tallies.len()
    }

    /// Discard every tally at a view `<= view`. Later votes for those views
    /// are reported as stale.
    pub fn prune_up_to_view(&mut self, view: View) -> usize {
        if view <= self.pruned_view {
            return 0;
        }

        let (retained, ballots) = match view.checked_add(1) {
            Some(first_kept) => (
                self.tallies.split_off(&VoteKey::new(first_kept, BlockId::ZERO)),
                self.ballots.split_off(&(first_kept, ReplicaId::default())),
            ),
            None => (BTreeMap::new(), BTreeMap::new()),
        };
        let removed = std::mem::replace(&mut self.tallies, retained).len();
        self.ballots = ballots;
        self.pruned_view = view;

        debug!(view, removed, "Vote tallies pruned");
        removed
    }

    /// Cheap checks that need no signature work.
    fn screen(&self, vote: &Vote) -> Option<VoteOutcome> {
        if vote.view <= self.pruned_view {
            debug!(voter = %vote.voter, view = vote.view, "Stale vote dropped");
            metrics::record_vote_rejected("stale");
            return Some(VoteOutcome::Stale);
        }

        match self.ballots.get(&(vote.view, vote.voter)) {
            Some(block_id) if *block_id == vote.block_id => {
                debug!(voter = %vote.voter, view = vote.view, "Duplicate vote ignored");
                Some(VoteOutcome::Duplicate)
            }
            Some(first) => {
                warn!(
                    voter = %vote.voter,
                    view = vote.view,
                    first = %first,
                    second = %vote.block_id,
                    "Replica voted for two blocks in one view"
                );
                metrics::record_vote_rejected("equivocation");
                Some(VoteOutcome::Equivocation)
            }
            None => None,
        }
    }

    /// Record a verified vote that passed [`screen`](Self::screen).
    ///
    /// The certificate is signed before any state changes, so a signing
    /// failure leaves the tally as it was.
    fn record_verified(&mut self, vote: Vote) -> CryptoResult<VoteOutcome> {
        let key = VoteKey::of(&vote);
        let (count, certified) = self
            .tallies
            .get(&key)
            .map_or((0, false), |tally| (tally.votes.len(), tally.certified));

        let leader_signature = if !certified && count + 1 >= self.threshold {
            let message = quorum_certificate_id(key.view, &key.block_id);
            Some(self.signer.sign(&message, self.local)?)
        } else {
            None
        };

        self.ballots.insert((vote.view, vote.voter), vote.block_id);
        let tally = self.tallies.entry(key).or_default();
        tally.votes.insert(vote.voter, vote.signature);

        let Some(leader_signature) = leader_signature else {
            return Ok(VoteOutcome::Recorded);
        };
        let qc = QuorumCertificate {
            view: key.view,
            block_id: key.block_id,
            leader: self.local,
            leader_signature,
            signers: tally.votes.keys().copied().collect(),
            signatures: tally.votes.values().cloned().collect(),
        };
        tally.certified = true;

        metrics::record_qc_formed();
        info!(view = key.view, block = %key.block_id, signers = qc.signer_count(), "Quorum certificate formed");
        Ok(VoteOutcome::QuorumFormed(qc))
    }
}
