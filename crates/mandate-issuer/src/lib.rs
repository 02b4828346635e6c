// Path: crates/mandate-issuer/src/lib.rs

//! # Mandate Issuer
//!
//! Signed mandate token issuance, verification, sub-mandate delegation, and
//! v1→v2 schema migration (§4.6).
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

pub mod codec;
pub mod issuer;
pub mod migrate;

pub use issuer::{DelegateRequest, IssueRequest, MandateIntrospector, MandateIssuer};
