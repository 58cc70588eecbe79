//! # Signature Service
//!
//! The signing contract the consensus core depends on, and `KeyStore`, the
//! implementation that owns a deployment's key material.
//!
//! ## Quorum Certificate Verification
//!
//! A certificate is valid when the leader's signature over the certificate
//! identifier verifies AND every bundled signature verifies against the
//! certified block identifier under its signer's key. The leader is checked
//! first; the first failing signature short-circuits to `Ok(false)`.

use crate::{CryptoError, CryptoResult, PrivateKey, PublicKey, SigningAlgorithm};
use rayon::prelude::*;
use shared_types::{vote_signing_message, QuorumCertificate, ReplicaId, Signature};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One entry of a batch verification.
#[derive(Clone, Debug)]
pub struct VerificationRequest {
    /// Claimed signer
    pub signer: ReplicaId,
    /// Signed bytes
    pub message: Vec<u8>,
    /// Signature to check
    pub signature: Signature,
}

/// Per-replica signing and verification.
///
/// Implementations are stateless per call and safe to share across threads.
pub trait SignatureService: Send + Sync {
    /// Scheme every key of this service uses.
    fn algorithm(&self) -> SigningAlgorithm;

    /// Sign `message` as `signer`.
    ///
    /// Fails with `UnknownSigner` when no private key is held for `signer`.
    fn sign(&self, message: &[u8], signer: ReplicaId) -> CryptoResult<Signature>;

    /// Whether a private key is held for `signer`.
    fn can_sign(&self, signer: &ReplicaId) -> bool;

    /// Check `signature` over `message` against `signer`'s public key.
    ///
    /// `Err` on malformed input or unknown signer, `Ok(false)` on mismatch.
    fn verify(&self, signature: &Signature, message: &[u8], signer: ReplicaId)
        -> CryptoResult<bool>;

    /// Verify the leader signature and every signer of a certificate.
    fn verify_quorum_certificate(&self, qc: &QuorumCertificate) -> CryptoResult<bool> {
        if qc.signers.len() != qc.signatures.len() {
            return Err(CryptoError::MalformedCertificate {
                signers: qc.signers.len(),
                signatures: qc.signatures.len(),
            });
        }

        let mut seen = HashSet::with_capacity(qc.signers.len());
        for signer in &qc.signers {
            if !seen.insert(*signer) {
                return Err(CryptoError::DuplicateSigner(*signer));
            }
        }

        if !self.verify(&qc.leader_signature, &qc.signing_message(), qc.leader)? {
            debug!(view = qc.view, leader = %qc.leader, "QC leader signature mismatch");
            return Ok(false);
        }

        let message = vote_signing_message(&qc.block_id);
        for (signer, signature) in qc.signed_by() {
            if !self.verify(signature, &message, *signer)? {
                debug!(view = qc.view, signer = %signer, "QC member signature mismatch");
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Verify many signatures in parallel. Results keep the input order.
    fn verify_batch(&self, requests: &[VerificationRequest]) -> Vec<CryptoResult<bool>> {
        requests
            .par_iter()
            .map(|request| self.verify(&request.signature, &request.message, request.signer))
            .collect()
    }
}

/// Key material of a deployment, keyed by replica identity.
///
/// A production replica holds its own private key and every public key; a
/// simulation can hold all private keys at once.
#[derive(Debug)]
pub struct KeyStore {
    algorithm: SigningAlgorithm,
    private_keys: HashMap<ReplicaId, PrivateKey>,
    public_keys: HashMap<ReplicaId, PublicKey>,
}

impl KeyStore {
    /// Create an empty store for `algorithm`.
    pub fn new(algorithm: SigningAlgorithm) -> Self {
        Self {
            algorithm,
            private_keys: HashMap::new(),
            public_keys: HashMap::new(),
        }
    }

    /// Generate a random key for every replica.
    pub fn generate(
        algorithm: SigningAlgorithm,
        replicas: impl IntoIterator<Item = ReplicaId>,
    ) -> CryptoResult<Self> {
        let mut store = Self::new(algorithm);
        for replica in replicas {
            store.insert_private_key(replica, PrivateKey::generate(algorithm)?)?;
        }
        Ok(store)
    }

    /// Derive every replica's key from a shared seed.
    pub fn from_seed(
        algorithm: SigningAlgorithm,
        replicas: impl IntoIterator<Item = ReplicaId>,
        seed: &[u8; 32],
    ) -> CryptoResult<Self> {
        let mut store = Self::new(algorithm);
        for replica in replicas {
            store.insert_private_key(replica, PrivateKey::derive(algorithm, seed, replica)?)?;
        }
        Ok(store)
    }

    /// Derive the view of a single replica: its own private key plus every
    /// public key of the deployment.
    pub fn from_seed_for_replica(
        algorithm: SigningAlgorithm,
        replicas: impl IntoIterator<Item = ReplicaId>,
        seed: &[u8; 32],
        local: ReplicaId,
    ) -> CryptoResult<Self> {
        let mut store = Self::new(algorithm);
        for replica in replicas {
            let key = PrivateKey::derive(algorithm, seed, replica)?;
            if replica == local {
                store.insert_private_key(replica, key)?;
            } else {
                store.insert_public_key(replica, key.public_key())?;
            }
        }
        Ok(store)
    }

    /// Register a private key (and its public key) for `replica`.
    pub fn insert_private_key(&mut self, replica: ReplicaId, key: PrivateKey) -> CryptoResult<()> {
        self.check_algorithm(key.algorithm())?;
        self.public_keys.insert(replica, key.public_key());
        self.private_keys.insert(replica, key);
        Ok(())
    }

    /// Register only the public key of `replica`.
    pub fn insert_public_key(&mut self, replica: ReplicaId, key: PublicKey) -> CryptoResult<()> {
        self.check_algorithm(key.algorithm())?;
        self.public_keys.insert(replica, key);
        Ok(())
    }

    /// Public key of `replica`, if known.
    pub fn public_key(&self, replica: &ReplicaId) -> Option<&PublicKey> {
        self.public_keys.get(replica)
    }

    /// Number of replicas with a known public key.
    pub fn len(&self) -> usize {
        self.public_keys.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.public_keys.is_empty()
    }

    fn check_algorithm(&self, actual: SigningAlgorithm) -> CryptoResult<()> {
        if actual != self.algorithm {
            return Err(CryptoError::AlgorithmMismatch {
                expected: self.algorithm,
                actual,
            });
        }
        Ok(())
    }
}

impl SignatureService for KeyStore {
    fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    fn sign(&self, message: &[u8], signer: ReplicaId) -> CryptoResult<Signature> {
        self.private_keys
            .get(&signer)
            .map(|key| key.sign(message))
            .ok_or(CryptoError::UnknownSigner(signer))
    }

    fn can_sign(&self, signer: &ReplicaId) -> bool {
        self.private_keys.contains_key(signer)
    }

    fn verify(
        &self,
        signature: &Signature,
        message: &[u8],
        signer: ReplicaId,
    ) -> CryptoResult<bool> {
        self.public_keys
            .get(&signer)
            .ok_or(CryptoError::UnknownSigner(signer))?
            .verify(message, signature)
    }
}
