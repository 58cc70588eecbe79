//! Driven ports (outbound dependencies)
//!
//! Signing and verification are supplied by `shared-crypto`. Any type that
//! implements [`SignatureService`] can back a chain; tests inject key stores
//! holding every replica's keys.

pub use shared_crypto::{SignatureService, VerificationRequest};
