//! # Shared Types Crate
//!
//! Domain entities exchanged between replicas of the chained BFT core.
//!
//! ## Design Principles
//!
//! - **Content addressing**: a block's identifier is the Keccak-256 hash of its
//!   contents, so identical identifiers imply identical blocks.
//! - **Views as levels**: every block and certificate carries the view it was
//!   proposed in; view 0 belongs to the genesis certificate only.
//! - **Opaque signatures**: signature bytes are scheme-agnostic here; the
//!   `shared-crypto` crate gives them meaning.

pub mod entities;

pub use entities::*;
