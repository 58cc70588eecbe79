//! Crypto error types.

use crate::SigningAlgorithm;
use shared_types::ReplicaId;
use thiserror::Error;

/// Cryptographic operation errors.
///
/// These signal malformed input or missing key material. A well-formed
/// signature that simply does not match is reported as `Ok(false)` instead.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No key material registered for the replica
    #[error("No key material for replica {0}")]
    UnknownSigner(ReplicaId),

    /// Signature has the wrong size for the configured scheme
    #[error("Invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength {
        /// Expected signature length in bytes
        expected: usize,
        /// Actual signature length in bytes
        actual: usize,
    },

    /// Signature bytes do not decode to a valid signature
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Public key bytes do not decode to a valid key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Secret material is not a valid private key
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Key generation failed
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Key belongs to a different scheme than the store
    #[error("Algorithm mismatch: store uses {expected}, key is {actual}")]
    AlgorithmMismatch {
        /// Scheme of the key store
        expected: SigningAlgorithm,
        /// Scheme of the offered key
        actual: SigningAlgorithm,
    },

    /// Signer list and signature bundle are not index-aligned
    #[error("Malformed certificate: {signers} signers but {signatures} signatures")]
    MalformedCertificate {
        /// Number of listed signers
        signers: usize,
        /// Number of bundled signatures
        signatures: usize,
    },

    /// The same replica appears twice in a certificate
    #[error("Duplicate signer in certificate: {0}")]
    DuplicateSigner(ReplicaId),

    /// Unrecognised algorithm name
    #[error("Unknown signing algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;
