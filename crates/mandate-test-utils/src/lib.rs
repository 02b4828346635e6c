// Path: crates/mandate-test-utils/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # Mandate Kernel Test Utilities
//!
//! Shared test plumbing for the mandate authorization kernel's crates: a mock
//! `SemanticEvaluator`, deterministic seeded randomness, file-backed fixtures,
//! and assertion macros used across the per-crate `#[cfg(test)]` modules.

pub mod assertions;
pub mod fixtures;
pub mod randomness;
pub mod semantic_mock;
