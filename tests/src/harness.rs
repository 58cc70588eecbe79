//! # Test Harness
//!
//! Helpers shared by the integration suite and the benchmarks:
//!
//! - a deployment-wide `KeyStore` that can sign as any replica
//! - certificate and chain builders
//! - `Cluster`, n replicas each running its own `ChainService`

use chained_consensus::{BlockChain, ChainApi, ChainConfig, ChainHandle, ChainResult, ChainService};
use shared_crypto::{KeyStore, SignatureService, SigningAlgorithm};
use shared_types::{
    quorum_certificate_id, vote_signing_message, Block, BlockId, QuorumCertificate, ReplicaId,
    View, Vote,
};
use std::sync::{Arc, Once};
use tokio::task::JoinHandle;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Seed every test deployment derives its keys from.
pub const SEED: [u8; 32] = [0x5e; 32];

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// `n = 3f + 1` configuration with the given scheme.
pub fn config(byz_no: usize, scheme: SigningAlgorithm) -> ChainConfig {
    ChainConfig::new(3 * byz_no + 1, byz_no).with_signature_scheme(scheme)
}

/// Keys of every replica of `config`.
pub fn deployment_keys(config: &ChainConfig) -> Arc<KeyStore> {
    Arc::new(
        KeyStore::from_seed(config.signature_scheme, config.replicas(), &SEED)
            .expect("seeded key derivation"),
    )
}

/// Keys as seen by replica `local`: its own private key, everyone's public key.
pub fn replica_keys(config: &ChainConfig, local: ReplicaId) -> Arc<KeyStore> {
    Arc::new(
        KeyStore::from_seed_for_replica(config.signature_scheme, config.replicas(), &SEED, local)
            .expect("seeded key derivation"),
    )
}

/// Vote of `voter` for `block`.
pub fn vote(keys: &KeyStore, voter: ReplicaId, block: &Block) -> Vote {
    let signature = keys
        .sign(&vote_signing_message(&block.id), voter)
        .expect("voter key present");
    Vote::new(voter, block.view, block.id, signature)
}

/// Certificate over `block` signed by `signers` and assembled by `leader`.
pub fn certificate(
    keys: &KeyStore,
    block: &Block,
    signers: &[ReplicaId],
    leader: ReplicaId,
) -> QuorumCertificate {
    let message = vote_signing_message(&block.id);
    let mut signers = signers.to_vec();
    signers.sort();
    QuorumCertificate {
        view: block.view,
        block_id: block.id,
        leader,
        leader_signature: keys
            .sign(&quorum_certificate_id(block.view, &block.id), leader)
            .expect("leader key present"),
        signatures: signers
            .iter()
            .map(|signer| keys.sign(&message, *signer).expect("signer key present"))
            .collect(),
        signers,
    }
}

/// Certificate over `block` from the first `threshold` replicas.
pub fn quorum_certificate(keys: &KeyStore, config: &ChainConfig, block: &Block) -> QuorumCertificate {
    let signers: Vec<ReplicaId> = config.replicas().take(config.quorum_threshold()).collect();
    certificate(keys, block, &signers, signers[0])
}

/// Block at `view` extending `parent` with a quorum certificate.
pub fn child(
    keys: &KeyStore,
    config: &ChainConfig,
    parent: &Block,
    view: View,
    proposer: ReplicaId,
) -> Block {
    Block::new(view, proposer, quorum_certificate(keys, config, parent), vec![])
}

/// Block at `view` rooted in the genesis certificate.
pub fn root(view: View, proposer: ReplicaId) -> Block {
    Block::new(view, proposer, QuorumCertificate::genesis(), vec![])
}

/// Round-robin proposer of `view`.
pub fn leader(config: &ChainConfig, view: View) -> ReplicaId {
    ReplicaId((view % config.total_nodes as u64) as u32 + 1)
}

/// Linear chain of `length` blocks at views `1..=length`, each certifying
/// its parent.
pub fn linear_chain(keys: &KeyStore, config: &ChainConfig, length: u64) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::with_capacity(length as usize);
    for view in 1..=length {
        let block = match blocks.last() {
            None => root(view, leader(config, view)),
            Some(parent) => child(keys, config, parent, view, leader(config, view)),
        };
        blocks.push(block);
    }
    blocks
}

/// Block to commit after `block` is admitted, under the three-chain rule:
/// `block` certifies `b2`, `b2` certifies `b1`, `b1` certifies `b0`, and
/// the views of `b0`, `b1`, `b2` are consecutive.
pub fn three_chain_target<A: ChainApi + ?Sized>(chain: &A, block: &Block) -> Option<BlockId> {
    let b2 = chain.get_parent_block(&block.id).ok()?;
    let b1 = chain.get_parent_block(&b2.id).ok()?;
    let b0 = chain.get_parent_block(&b1.id).ok()?;
    (b2.view == b1.view + 1 && b1.view == b0.view + 1).then_some(b0.id)
}

/// One replica of a cluster.
pub struct Replica {
    pub id: ReplicaId,
    pub keys: Arc<KeyStore>,
    pub chain: ChainHandle<KeyStore>,
}

impl Replica {
    /// This replica's vote for `block`.
    pub fn vote(&self, block: &Block) -> Vote {
        vote(&self.keys, self.id, block)
    }
}

/// In-process deployment: one chain service per replica.
pub struct Cluster {
    pub config: ChainConfig,
    pub replicas: Vec<Replica>,
    workers: Vec<JoinHandle<()>>,
}

impl Cluster {
    /// Start every replica of `config`. Must run inside a tokio runtime.
    pub fn start(config: ChainConfig) -> Self {
        let mut replicas = Vec::with_capacity(config.total_nodes);
        let mut workers = Vec::with_capacity(config.total_nodes);
        for id in config.replicas() {
            let keys = replica_keys(&config, id);
            let chain = BlockChain::new(config.clone(), id, Arc::clone(&keys))
                .expect("valid cluster config");
            let (handle, worker) = ChainService::spawn(chain);
            replicas.push(Replica {
                id,
                keys,
                chain: handle,
            });
            workers.push(worker);
        }
        Self {
            config,
            replicas,
            workers,
        }
    }

    pub fn replica(&self, id: ReplicaId) -> &Replica {
        &self.replicas[id.index() as usize - 1]
    }

    pub fn leader(&self, view: View) -> ReplicaId {
        leader(&self.config, view)
    }

    /// Block proposed by `proposer` at `view` on top of its high QC.
    pub fn propose(&self, proposer: ReplicaId, view: View, payload: Vec<Vec<u8>>) -> Block {
        let qc = self.replica(proposer).chain.high_qc();
        Block::new(view, proposer, qc, payload)
    }

    /// Deliver `block` to `targets`, returning each replica's result.
    pub async fn deliver(
        &self,
        block: &Block,
        targets: impl IntoIterator<Item = ReplicaId>,
    ) -> Vec<ChainResult<bool>> {
        let mut results = Vec::new();
        for id in targets {
            results.push(self.replica(id).chain.add_block(block.clone()).await);
        }
        results
    }

    /// Deliver `block` to every replica.
    pub async fn broadcast(&self, block: &Block) -> Vec<ChainResult<bool>> {
        self.deliver(block, self.config.replicas()).await
    }

    /// Send the votes of `voters` for `block` to `collector`. A certificate
    /// formed on the way becomes the collector's high QC.
    pub async fn collect_votes(
        &self,
        collector: ReplicaId,
        block: &Block,
        voters: impl IntoIterator<Item = ReplicaId>,
    ) -> Option<QuorumCertificate> {
        let target = &self.replica(collector).chain;
        let mut formed = None;
        for voter in voters {
            let vote = self.replica(voter).vote(block);
            let outcome = target.add_vote(vote).await.expect("collector can sign");
            if let Some(qc) = outcome.into_quorum_certificate() {
                target
                    .update_high_qc(qc.clone())
                    .await
                    .expect("service running");
                formed = Some(qc);
            }
        }
        formed
    }

    /// Commit on every replica whose chain satisfies the three-chain rule
    /// for `block`. Returns how many replicas committed.
    pub async fn commit_where_ready(&self, block: &Block) -> usize {
        let mut committed = 0;
        for replica in &self.replicas {
            if let Some(target) = three_chain_target(&replica.chain, block) {
                replica
                    .chain
                    .commit_block(target)
                    .await
                    .expect("target present");
                committed += 1;
            }
        }
        committed
    }

    /// Run views `first..=last` with every replica honest and online.
    /// Returns the proposed blocks.
    pub async fn run_views(&self, first: View, last: View) -> Vec<Block> {
        let mut blocks = Vec::new();
        for view in first..=last {
            let proposer = self.leader(view);
            debug!(view, proposer = %proposer, "proposing");
            let block = self.propose(proposer, view, vec![view.to_le_bytes().to_vec()]);
            for result in self.broadcast(&block).await {
                result.expect("honest block admitted");
            }
            self.commit_where_ready(&block).await;
            self.collect_votes(self.leader(view + 1), &block, self.config.replicas())
                .await;
            blocks.push(block);
        }
        blocks
    }

    /// Stop every replica and wait for the workers to exit.
    pub async fn shutdown(self) {
        drop(self.replicas);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
