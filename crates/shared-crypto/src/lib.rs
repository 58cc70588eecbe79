//! # Shared Crypto - Signature Service
//!
//! Signing and verification for votes and quorum certificates.
//!
//! ## Components
//!
//! | Module | Contents | Use Case |
//! |--------|----------|----------|
//! | `keys` | `SigningAlgorithm`, `PrivateKey`, `PublicKey` | One backend per scheme |
//! | `service` | `SignatureService`, `KeyStore` | Sign / verify by replica identity |
//! | `errors` | `CryptoError` | Malformed input, missing keys |
//!
//! ## Supported Schemes
//!
//! - **Ed25519**: deterministic nonces, 64-byte signatures
//! - **ECDSA secp256k1**: RFC 6979 nonces, 64-byte r||s signatures
//! - **BLS12-381** (min-pk): 96-byte signatures, 48-byte public keys
//!
//! Callers never branch on the scheme: the algorithm is fixed when the
//! `KeyStore` is built and every call dispatches through `SignatureService`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod keys;
pub mod service;

// Re-exports
pub use errors::{CryptoError, CryptoResult};
pub use keys::{PrivateKey, PublicKey, SigningAlgorithm};
pub use service::{KeyStore, SignatureService, VerificationRequest};
