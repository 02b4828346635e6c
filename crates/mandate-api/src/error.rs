// Path: crates/mandate-api/src/error.rs
//! Re-export the core error taxonomy from the central types crate so that
//! capability implementors only need to depend on `mandate-api`.
pub use mandate_types::error::{CryptoError, MandateError, Result};
