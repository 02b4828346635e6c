// Path: crates/mandate-crypto/src/error.rs
//! Local error types for the `mandate-crypto` crate.

// Re-export the canonical error type from the API crate.
pub use mandate_api::error::CryptoError;
