// Path: crates/mandate-api/src/lib.rs

//! # Mandate Kernel API
//!
//! Core traits and interfaces for the mandate authorization kernel. This
//! crate defines the stable contract between the kernel's core logic and
//! the capabilities it consumes (storage, cache, key management, event
//! publication, semantic evaluation) without depending on any concrete
//! backend for them.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

/// External capability contracts (§6): `Storage`, `Cache`, `EventBus`,
/// `KeyStore`, `SemanticEvaluator`, `Clock`, `RNG`, `PaymentRail`.
pub mod capabilities;
/// Defines unified traits for signing-key cryptographic primitives.
pub mod crypto;
/// Re-exports the central error taxonomy from `mandate-types`.
pub mod error;

/// A curated set of the most commonly used traits and types.
pub mod prelude {
    pub use crate::capabilities::{
        AuditDraft, AuditSink, Cache, Clock, DistributedLock, EventBus, KeyAlgorithm, KeyState,
        KeyStore, PaymentRail, Rng, SemanticEvaluation, SemanticEvaluator, Storage,
    };
    pub use crate::crypto::{SerializableKey, Signature, SigningKey, SigningKeyPair, VerifyingKey};
    pub use crate::error::{CryptoError, MandateError, Result};
}
