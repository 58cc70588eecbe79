//! Chain Service
//!
//! One tokio task owns every mutation of a replica's chain. Handles submit
//! commands over a bounded queue and await the reply; commands are applied
//! strictly in the order the queue accepts them.
//!
//! The chain sits behind a `parking_lot::RwLock`. The worker takes the write
//! lock once per command and releases it before awaiting the next one, so
//! readers on other threads only ever see whole commands.
//!
//! Signature checks run on the blocking pool before a command is queued.
//! Blocks reach the worker validated and votes arrive with their verdict,
//! so the write lock only covers bookkeeping.

use crate::domain::{
    validate_block, verify_vote, verify_votes, BlockChain, ChainError, ChainResult, ChainStats,
    VoteOutcome,
};
use crate::ports::ChainApi;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_crypto::SignatureService;
use shared_types::{Block, BlockId, QuorumCertificate, View, Vote};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A mutation queued for the worker.
#[derive(Debug)]
pub enum ChainCommand {
    /// A block that passed `validate_block`
    AddBlock {
        block: Block,
        reply: oneshot::Sender<ChainResult<bool>>,
    },
    /// A vote and whether its signature verified
    AddVote {
        vote: Vote,
        valid: bool,
        reply: oneshot::Sender<ChainResult<VoteOutcome>>,
    },
    AddVotes {
        votes: Vec<(Vote, bool)>,
        reply: oneshot::Sender<ChainResult<Vec<VoteOutcome>>>,
    },
    UpdateHighQc {
        qc: QuorumCertificate,
        reply: oneshot::Sender<bool>,
    },
    CommitBlock {
        id: BlockId,
        reply: oneshot::Sender<ChainResult<Vec<Arc<Block>>>>,
    },
}

impl ChainCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::AddBlock { .. } => "add_block",
            Self::AddVote { .. } => "add_vote",
            Self::AddVotes { .. } => "add_votes",
            Self::UpdateHighQc { .. } => "update_high_qc",
            Self::CommitBlock { .. } => "commit_block",
        }
    }
}

/// Spawns the worker that owns a chain.
pub struct ChainService;

impl ChainService {
    /// Move `chain` into a worker task on the current tokio runtime.
    ///
    /// The worker stops once every handle is dropped and the queue drains.
    pub fn spawn<S>(chain: BlockChain<S>) -> (ChainHandle<S>, JoinHandle<()>)
    where
        S: SignatureService + 'static,
    {
        let capacity = chain.config().chan_buffer_size;
        let local = chain.local();
        let signer = Arc::clone(chain.signer());
        let threshold = chain.quorum().threshold();
        let (commands, receiver) = mpsc::channel(capacity);
        let chain = Arc::new(RwLock::new(chain));

        let worker = tokio::spawn(run(Arc::clone(&chain), receiver));
        info!(local = %local, capacity, "Chain service started");

        (
            ChainHandle {
                commands,
                chain,
                signer,
                threshold,
            },
            worker,
        )
    }
}

async fn run<S: SignatureService>(
    chain: Arc<RwLock<BlockChain<S>>>,
    mut commands: mpsc::Receiver<ChainCommand>,
) {
    while let Some(command) = commands.recv().await {
        apply(&chain, command);
    }
    info!("Chain service stopped");
}

fn apply<S: SignatureService>(chain: &RwLock<BlockChain<S>>, command: ChainCommand) {
    let name = command.name();
    let mut chain = chain.write();
    // A dropped receiver means the caller stopped waiting; the command
    // still took effect.
    let delivered = match command {
        ChainCommand::AddBlock { block, reply } => {
            reply.send(chain.add_validated_block(block)).is_ok()
        }
        ChainCommand::AddVote { vote, valid, reply } => {
            reply.send(chain.add_checked_vote(vote, valid)).is_ok()
        }
        ChainCommand::AddVotes { votes, reply } => {
            reply.send(chain.add_checked_votes(votes)).is_ok()
        }
        ChainCommand::UpdateHighQc { qc, reply } => reply.send(chain.update_high_qc(qc)).is_ok(),
        ChainCommand::CommitBlock { id, reply } => reply.send(chain.commit_block(&id)).is_ok(),
    };
    if !delivered {
        debug!(command = name, "Reply receiver dropped");
    }
}

/// Cloneable handle to a running chain service.
pub struct ChainHandle<S: SignatureService> {
    commands: mpsc::Sender<ChainCommand>,
    chain: Arc<RwLock<BlockChain<S>>>,
    signer: Arc<S>,
    threshold: usize,
}

impl<S: SignatureService> Clone for ChainHandle<S> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            chain: Arc::clone(&self.chain),
            signer: Arc::clone(&self.signer),
            threshold: self.threshold,
        }
    }
}

impl<S: SignatureService> ChainHandle<S> {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ChainCommand,
    ) -> ChainResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ChainError::ServiceClosed)?;
        response.await.map_err(|_| ChainError::ServiceClosed)
    }

    /// Run `f` against the chain under the read lock.
    pub fn read<T>(&self, f: impl FnOnce(&BlockChain<S>) -> T) -> T {
        let chain = self.chain.read();
        f(&*chain)
    }

    /// Whether the worker has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl<S: SignatureService + 'static> ChainHandle<S> {
    /// Run signature work on the blocking pool, outside the chain lock.
    async fn verify<T>(&self, check: impl FnOnce(&S) -> T + Send + 'static) -> ChainResult<T>
    where
        T: Send + 'static,
    {
        let signer = Arc::clone(&self.signer);
        tokio::task::spawn_blocking(move || check(&*signer))
            .await
            .map_err(|e| {
                error!(error = %e, "Verification task panicked");
                ChainError::VerificationAborted
            })
    }
}

#[async_trait]
impl<S: SignatureService + 'static> ChainApi for ChainHandle<S> {
    async fn add_block(&self, block: Block) -> ChainResult<bool> {
        if self.read(|chain| chain.contains_block(&block.id)) {
            debug!(block = %block.id, view = block.view, "Duplicate block ignored");
            return Ok(false);
        }

        let threshold = self.threshold;
        let block = self
            .verify(move |signer| validate_block(signer, threshold, &block).map(|()| block))
            .await??;
        self.request(|reply| ChainCommand::AddBlock { block, reply })
            .await?
    }

    async fn add_vote(&self, vote: Vote) -> ChainResult<VoteOutcome> {
        let (vote, valid) = self
            .verify(move |signer| {
                let valid = verify_vote(signer, &vote);
                (vote, valid)
            })
            .await?;
        self.request(|reply| ChainCommand::AddVote { vote, valid, reply })
            .await?
    }

    async fn add_votes(&self, votes: Vec<Vote>) -> ChainResult<Vec<VoteOutcome>> {
        let votes = self
            .verify(move |signer| {
                let verdicts = verify_votes(signer, &votes);
                votes.into_iter().zip(verdicts).collect::<Vec<_>>()
            })
            .await?;
        self.request(|reply| ChainCommand::AddVotes { votes, reply })
            .await?
    }

    async fn update_high_qc(&self, qc: QuorumCertificate) -> ChainResult<bool> {
        self.request(|reply| ChainCommand::UpdateHighQc { qc, reply })
            .await
    }

    async fn commit_block(&self, id: BlockId) -> ChainResult<Vec<Arc<Block>>> {
        self.request(|reply| ChainCommand::CommitBlock { id, reply })
            .await?
    }

    fn high_qc(&self) -> QuorumCertificate {
        self.read(|chain| chain.high_qc().clone())
    }

    fn get_block_by_id(&self, id: &BlockId) -> ChainResult<Arc<Block>> {
        self.read(|chain| chain.get_block_by_id(id))
    }

    fn get_parent_block(&self, id: &BlockId) -> ChainResult<Arc<Block>> {
        self.read(|chain| chain.get_parent_block(id))
    }

    fn get_grand_parent_block(&self, id: &BlockId) -> ChainResult<Arc<Block>> {
        self.read(|chain| chain.get_grand_parent_block(id))
    }

    fn get_children_blocks(&self, id: &BlockId) -> Vec<Arc<Block>> {
        self.read(|chain| chain.get_children_blocks(id))
    }

    fn get_block_by_view(&self, view: View) -> ChainResult<Arc<Block>> {
        self.read(|chain| chain.get_block_by_view(view))
    }

    fn stats(&self) -> ChainStats {
        self.read(|chain| chain.stats())
    }
}
