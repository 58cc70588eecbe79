//! # Key Material
//!
//! Tagged key types, one variant per supported signing scheme.
//!
//! ## Security Properties
//!
//! - Ed25519 and secp256k1 signing is deterministic (no RNG at sign time)
//! - secp256k1 signatures are low-S normalized
//! - BLS signatures are group-checked and keys validated on verification
//! - Seed-derived secret material is zeroized after key construction

use crate::{CryptoError, CryptoResult};
use blst::min_pk::{
    PublicKey as BlsPublicKey, SecretKey as BlsSecretKey, Signature as BlsSignature,
};
use blst::BLST_ERROR;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use shared_types::{ReplicaId, Signature};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

/// Domain separation tag for BLS signatures (Ethereum 2.0 compatible)
const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Signing scheme used by every replica of a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// Ed25519 over Curve25519
    #[serde(rename = "ED25519")]
    Ed25519,
    /// ECDSA over secp256k1
    #[serde(rename = "ECDSA_SECp256k1")]
    EcdsaSecp256k1,
    /// BLS over BLS12-381, public keys in G1
    #[serde(rename = "BLS_BLS12381")]
    BlsBls12381,
}

impl SigningAlgorithm {
    /// Size of an encoded signature in bytes.
    pub fn signature_len(&self) -> usize {
        match self {
            SigningAlgorithm::Ed25519 => 64,
            SigningAlgorithm::EcdsaSecp256k1 => 64,
            SigningAlgorithm::BlsBls12381 => 96,
        }
    }

    /// Size of an encoded (compressed) public key in bytes.
    pub fn public_key_len(&self) -> usize {
        match self {
            SigningAlgorithm::Ed25519 => 32,
            SigningAlgorithm::EcdsaSecp256k1 => 33,
            SigningAlgorithm::BlsBls12381 => 48,
        }
    }

    /// Configuration name of the scheme.
    pub fn name(&self) -> &'static str {
        match self {
            SigningAlgorithm::Ed25519 => "ED25519",
            SigningAlgorithm::EcdsaSecp256k1 => "ECDSA_SECp256k1",
            SigningAlgorithm::BlsBls12381 => "BLS_BLS12381",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ED25519" => Ok(SigningAlgorithm::Ed25519),
            "ECDSA_SECp256k1" => Ok(SigningAlgorithm::EcdsaSecp256k1),
            "BLS_BLS12381" => Ok(SigningAlgorithm::BlsBls12381),
            other => Err(CryptoError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Secret signing key.
pub enum PrivateKey {
    /// Ed25519 signing key
    Ed25519(ed25519_dalek::SigningKey),
    /// secp256k1 ECDSA signing key
    EcdsaSecp256k1(k256::ecdsa::SigningKey),
    /// BLS12-381 secret key
    BlsBls12381(BlsSecretKey),
}

impl PrivateKey {
    /// Generate a random key.
    pub fn generate(algorithm: SigningAlgorithm) -> CryptoResult<Self> {
        let mut ikm = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut ikm);
        let key = Self::from_secret_material(algorithm, &ikm);
        ikm.zeroize();
        key
    }

    /// Derive the key of `replica` from a shared deployment seed.
    ///
    /// Every replica derives the same key for the same `(seed, replica)`, which
    /// lets simulations and tests rebuild the whole key set in-process.
    pub fn derive(
        algorithm: SigningAlgorithm,
        seed: &[u8; 32],
        replica: ReplicaId,
    ) -> CryptoResult<Self> {
        let mut hasher = Keccak256::new();
        hasher.update(b"cbft-replica-key");
        hasher.update(algorithm.name().as_bytes());
        hasher.update(seed);
        hasher.update(replica.index().to_le_bytes());
        let mut ikm: [u8; 32] = hasher.finalize().into();
        let key = Self::from_secret_material(algorithm, &ikm);
        ikm.zeroize();
        key
    }

    /// Build a key from 32 bytes of secret material.
    pub fn from_secret_material(algorithm: SigningAlgorithm, ikm: &[u8; 32]) -> CryptoResult<Self> {
        match algorithm {
            SigningAlgorithm::Ed25519 => {
                Ok(PrivateKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(ikm)))
            }
            SigningAlgorithm::EcdsaSecp256k1 => k256::ecdsa::SigningKey::from_bytes(ikm.into())
                .map(PrivateKey::EcdsaSecp256k1)
                .map_err(|_| CryptoError::InvalidPrivateKey),
            SigningAlgorithm::BlsBls12381 => BlsSecretKey::key_gen(ikm, &[])
                .map(PrivateKey::BlsBls12381)
                .map_err(|e| CryptoError::KeyGenerationFailed(format!("{:?}", e))),
        }
    }

    /// Scheme of this key.
    pub fn algorithm(&self) -> SigningAlgorithm {
        match self {
            PrivateKey::Ed25519(_) => SigningAlgorithm::Ed25519,
            PrivateKey::EcdsaSecp256k1(_) => SigningAlgorithm::EcdsaSecp256k1,
            PrivateKey::BlsBls12381(_) => SigningAlgorithm::BlsBls12381,
        }
    }

    /// Matching public key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
            PrivateKey::EcdsaSecp256k1(key) => {
                PublicKey::EcdsaSecp256k1(k256::ecdsa::VerifyingKey::from(key))
            }
            PrivateKey::BlsBls12381(key) => PublicKey::BlsBls12381(key.sk_to_pk()),
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        match self {
            PrivateKey::Ed25519(key) => {
                let sig = ed25519_dalek::Signer::sign(key, message);
                Signature::new(sig.to_bytes().to_vec())
            }
            PrivateKey::EcdsaSecp256k1(key) => {
                let sig: k256::ecdsa::Signature = k256::ecdsa::signature::Signer::sign(key, message);
                Signature::new(sig.to_bytes().to_vec())
            }
            PrivateKey::BlsBls12381(key) => {
                Signature::new(key.sign(message, BLS_DST, &[]).to_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({}, <redacted>)", self.algorithm())
    }
}

/// Public verification key.
#[derive(Clone, Debug)]
pub enum PublicKey {
    /// Ed25519 verifying key
    Ed25519(ed25519_dalek::VerifyingKey),
    /// secp256k1 ECDSA verifying key
    EcdsaSecp256k1(k256::ecdsa::VerifyingKey),
    /// BLS12-381 public key
    BlsBls12381(BlsPublicKey),
}

impl PublicKey {
    /// Decode a compressed public key.
    pub fn from_bytes(algorithm: SigningAlgorithm, bytes: &[u8]) -> CryptoResult<Self> {
        match algorithm {
            SigningAlgorithm::Ed25519 => {
                let raw: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
                ed25519_dalek::VerifyingKey::from_bytes(&raw)
                    .map(PublicKey::Ed25519)
                    .map_err(|_| CryptoError::InvalidPublicKey)
            }
            SigningAlgorithm::EcdsaSecp256k1 => k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                .map(PublicKey::EcdsaSecp256k1)
                .map_err(|_| CryptoError::InvalidPublicKey),
            SigningAlgorithm::BlsBls12381 => BlsPublicKey::from_bytes(bytes)
                .map(PublicKey::BlsBls12381)
                .map_err(|_| CryptoError::InvalidPublicKey),
        }
    }

    /// Compressed encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::Ed25519(key) => key.to_bytes().to_vec(),
            PublicKey::EcdsaSecp256k1(key) => key.to_sec1_bytes().to_vec(),
            PublicKey::BlsBls12381(key) => key.to_bytes().to_vec(),
        }
    }

    /// Scheme of this key.
    pub fn algorithm(&self) -> SigningAlgorithm {
        match self {
            PublicKey::Ed25519(_) => SigningAlgorithm::Ed25519,
            PublicKey::EcdsaSecp256k1(_) => SigningAlgorithm::EcdsaSecp256k1,
            PublicKey::BlsBls12381(_) => SigningAlgorithm::BlsBls12381,
        }
    }

    /// Verify `signature` over `message`.
    ///
    /// Returns `Err` when the signature cannot be decoded and `Ok(false)` when
    /// it decodes but does not match.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> CryptoResult<bool> {
        let expected = self.algorithm().signature_len();
        if signature.len() != expected {
            return Err(CryptoError::InvalidSignatureLength {
                expected,
                actual: signature.len(),
            });
        }

        match self {
            PublicKey::Ed25519(key) => {
                let raw: [u8; 64] = signature
                    .as_bytes()
                    .try_into()
                    .map_err(|_| CryptoError::InvalidSignatureFormat)?;
                let sig = ed25519_dalek::Signature::from_bytes(&raw);
                Ok(key.verify_strict(message, &sig).is_ok())
            }
            PublicKey::EcdsaSecp256k1(key) => {
                let sig = k256::ecdsa::Signature::from_slice(signature.as_bytes())
                    .map_err(|_| CryptoError::InvalidSignatureFormat)?;
                Ok(k256::ecdsa::signature::Verifier::verify(key, message, &sig).is_ok())
            }
            PublicKey::BlsBls12381(key) => {
                let sig = BlsSignature::from_bytes(signature.as_bytes())
                    .map_err(|_| CryptoError::InvalidSignatureFormat)?;
                Ok(sig.verify(true, message, BLS_DST, &[], key, true) == BLST_ERROR::BLST_SUCCESS)
            }
        }
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm() == other.algorithm() && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}
