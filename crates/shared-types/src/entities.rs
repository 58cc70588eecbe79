//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Identity**: `ReplicaId`, `BlockId`, `View`
//! - **Chain**: `Block`
//! - **Agreement**: `Vote`, `QuorumCertificate`, `Signature`

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha3::{Digest, Keccak256};
use std::fmt;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// A 32-byte Keccak-256 hash.
pub type Hash = [u8; 32];

/// Round number a block is proposed in. Doubles as the block's forest level.
pub type View = u64;

/// Identity of a replica taking part in consensus.
///
/// Replicas are numbered from 1; index 0 is never assigned.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ReplicaId(pub u32);

impl ReplicaId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Numeric position of the replica in the configuration.
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ReplicaId {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

/// Content hash identifying a block.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub Hash);

impl BlockId {
    /// Identifier used by the genesis certificate, which certifies no real block.
    pub const ZERO: BlockId = BlockId([0u8; 32]);

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<Hash> for BlockId {
    fn from(hash: Hash) -> Self {
        Self(hash)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId(")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

// =============================================================================
// CLUSTER B: AGREEMENT
// =============================================================================

/// Scheme-agnostic signature bytes.
///
/// 64 bytes for Ed25519 and ECDSA (r||s), 96 bytes for BLS12-381.
#[serde_as]
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(#[serde_as(as = "Bytes")] pub Vec<u8>);

impl Signature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} bytes", self.0.len())?;
        if self.0.len() >= 2 {
            write!(f, ", {:02x}{:02x}..", self.0[0], self.0[1])?;
        }
        write!(f, ")")
    }
}

/// Message a replica signs when voting for a block.
pub fn vote_signing_message(block_id: &BlockId) -> Vec<u8> {
    block_id.as_bytes().to_vec()
}

/// A single replica's endorsement of a block at a view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: ReplicaId,
    pub view: View,
    pub block_id: BlockId,
    /// Signature over [`vote_signing_message`].
    pub signature: Signature,
}

impl Vote {
    pub fn new(voter: ReplicaId, view: View, block_id: BlockId, signature: Signature) -> Self {
        Self {
            voter,
            view,
            block_id,
            signature,
        }
    }

    /// The bytes covered by `signature`.
    pub fn signing_message(&self) -> Vec<u8> {
        vote_signing_message(&self.block_id)
    }
}

/// Proof that a quorum of distinct replicas voted for `block_id` at `view`.
///
/// `signers` and `signatures` are index-aligned: `signatures[i]` is the vote
/// signature of `signers[i]` over the certified block identifier. The replica
/// that assembled the certificate signs [`QuorumCertificate::id`] as `leader`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCertificate {
    pub view: View,
    pub block_id: BlockId,
    pub leader: ReplicaId,
    pub leader_signature: Signature,
    pub signers: Vec<ReplicaId>,
    pub signatures: Vec<Signature>,
}

impl QuorumCertificate {
    /// Certificate every chain starts from. Trusted without verification.
    pub fn genesis() -> Self {
        Self {
            view: 0,
            block_id: BlockId::ZERO,
            leader: ReplicaId::default(),
            leader_signature: Signature::default(),
            signers: Vec::new(),
            signatures: Vec::new(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.view == 0 && self.block_id.is_zero() && self.signers.is_empty()
    }

    /// Identifier of the certificate: hash of the certified (view, block).
    pub fn id(&self) -> Hash {
        quorum_certificate_id(self.view, &self.block_id)
    }

    /// The bytes the leader signs.
    pub fn signing_message(&self) -> Vec<u8> {
        self.id().to_vec()
    }

    pub fn signer_count(&self) -> usize {
        self.signers.len()
    }

    pub fn has_signer(&self, replica: &ReplicaId) -> bool {
        self.signers.contains(replica)
    }

    /// Iterate `(signer, signature)` pairs of the aggregate bundle.
    pub fn signed_by(&self) -> impl Iterator<Item = (&ReplicaId, &Signature)> {
        self.signers.iter().zip(self.signatures.iter())
    }
}

/// Identifier of a certificate over `block_id` at `view`.
pub fn quorum_certificate_id(view: View, block_id: &BlockId) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(b"QC");
    hasher.update(view.to_le_bytes());
    hasher.update(block_id.as_bytes());
    hasher.finalize().into()
}

// =============================================================================
// CLUSTER C: THE CHAIN
// =============================================================================

/// A proposed unit of the chain.
///
/// The parent is always the block certified by the embedded `qc`; the QC view
/// is therefore the parent's level in the block forest.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub view: View,
    pub proposer: ReplicaId,
    pub parent: BlockId,
    pub qc: QuorumCertificate,
    #[serde_as(as = "Vec<Bytes>")]
    pub payload: Vec<Vec<u8>>,
}

impl Block {
    /// Build a block extending the block certified by `qc`.
    pub fn new(
        view: View,
        proposer: ReplicaId,
        qc: QuorumCertificate,
        payload: Vec<Vec<u8>>,
    ) -> Self {
        let parent = qc.block_id;
        let id = Self::compute_id(view, proposer, &parent, &qc, &payload);
        Self {
            id,
            view,
            proposer,
            parent,
            qc,
            payload,
        }
    }

    /// Compute the content hash of a block.
    pub fn compute_id(
        view: View,
        proposer: ReplicaId,
        parent: &BlockId,
        qc: &QuorumCertificate,
        payload: &[Vec<u8>],
    ) -> BlockId {
        let mut hasher = Keccak256::new();
        hasher.update(b"BLOCK");
        hasher.update(view.to_le_bytes());
        hasher.update(proposer.index().to_le_bytes());
        hasher.update(parent.as_bytes());
        hasher.update(qc.view.to_le_bytes());
        hasher.update(qc.block_id.as_bytes());
        hasher.update((payload.len() as u64).to_le_bytes());
        for command in payload {
            hasher.update((command.len() as u64).to_le_bytes());
            hasher.update(command);
        }
        BlockId(hasher.finalize().into())
    }

    /// Whether `id` matches the block's contents.
    pub fn has_valid_id(&self) -> bool {
        self.id == Self::compute_id(self.view, self.proposer, &self.parent, &self.qc, &self.payload)
    }

    /// View of the parent block, taken from the embedded certificate.
    pub fn parent_view(&self) -> View {
        self.qc.view
    }
}
