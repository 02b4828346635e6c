// Path: crates/mandate-orchestrator/src/lib.rs

//! # Mandate Orchestrator
//!
//! The `Authorize(req)` pipeline (§4.8): the one component allowed to see
//! both `mandate-identity` and `mandate-delegation`, because only it may
//! compose the identity freeze-cascade across them. Every other dependency
//! (policy, rate-limit, audit, issuer) stays a sibling the orchestrator
//! wires together rather than a peer that wires itself.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

pub mod orchestrator;

pub use orchestrator::Orchestrator;
