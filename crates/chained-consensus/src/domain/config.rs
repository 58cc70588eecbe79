//! Replica configuration

use super::ConfigError;
use serde::{Deserialize, Serialize};
use shared_crypto::SigningAlgorithm;
use shared_types::ReplicaId;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

/// Which replicas count as Byzantine when scoring committed blocks.
///
/// Classification only feeds the chain quality metric; it never changes
/// what the replica accepts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "replicas", rename_all = "snake_case")]
pub enum ByzantinePolicy {
    /// Every replica is honest
    None,
    /// Replicas `1..=byz_no`
    #[default]
    LowestIds,
    /// An explicit set
    Explicit(BTreeSet<ReplicaId>),
}

/// Chain configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Number of replicas (n)
    #[serde(alias = "n")]
    pub total_nodes: usize,
    /// Byzantine fault bound (f in 3f+1)
    #[serde(alias = "byzNo")]
    pub byz_no: usize,
    /// Signing scheme of every replica
    pub signature_scheme: SigningAlgorithm,
    pub byzantine: ByzantinePolicy,
    /// Capacity of the chain service command queue
    pub chan_buffer_size: usize,
    /// Views past the high QC for which votes are still tallied
    pub vote_view_window: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            total_nodes: 4,
            byz_no: 1,
            signature_scheme: SigningAlgorithm::EcdsaSecp256k1,
            byzantine: ByzantinePolicy::LowestIds,
            chan_buffer_size: 1024,
            vote_view_window: 1024,
        }
    }
}

impl ChainConfig {
    /// Default configuration for `total_nodes` replicas tolerating `byz_no` faults.
    pub fn new(total_nodes: usize, byz_no: usize) -> Self {
        Self {
            total_nodes,
            byz_no,
            ..Self::default()
        }
    }

    pub fn with_signature_scheme(mut self, scheme: SigningAlgorithm) -> Self {
        self.signature_scheme = scheme;
        self
    }

    pub fn with_byzantine(mut self, policy: ByzantinePolicy) -> Self {
        self.byzantine = policy;
        self
    }

    pub fn with_vote_view_window(mut self, window: u64) -> Self {
        self.vote_view_window = window;
        self
    }

    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        debug!(path = %path.display(), n = config.total_nodes, f = config.byz_no, "Config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_nodes == 0 {
            return Err(ConfigError::NoReplicas);
        }
        if self.total_nodes < 3 * self.byz_no + 1 {
            return Err(ConfigError::InvalidFaultBound {
                total_nodes: self.total_nodes,
                byz_no: self.byz_no,
            });
        }
        if self.chan_buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.vote_view_window == 0 {
            return Err(ConfigError::ZeroVoteWindow);
        }
        if let ByzantinePolicy::Explicit(set) = &self.byzantine {
            if set.len() > self.byz_no {
                warn!(
                    listed = set.len(),
                    byz_no = self.byz_no,
                    "More Byzantine replicas listed than the fault bound"
                );
            }
        }
        Ok(())
    }

    /// Distinct signers needed for a quorum certificate: `ceil((n + f + 1) / 2)`.
    ///
    /// Equals `2f + 1` when `n = 3f + 1`. Any two quorums intersect in at
    /// least `f + 1` replicas.
    pub fn quorum_threshold(&self) -> usize {
        (self.total_nodes + self.byz_no + 2) / 2
    }

    pub fn is_byzantine(&self, replica: ReplicaId) -> bool {
        match &self.byzantine {
            ByzantinePolicy::None => false,
            ByzantinePolicy::LowestIds => {
                replica.index() >= 1 && replica.index() as usize <= self.byz_no
            }
            ByzantinePolicy::Explicit(set) => set.contains(&replica),
        }
    }

    /// Replica identities `1..=n`.
    pub fn replicas(&self) -> impl Iterator<Item = ReplicaId> {
        (1..=self.total_nodes as u32).map(ReplicaId)
    }
}
