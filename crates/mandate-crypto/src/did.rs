// Path: crates/mandate-crypto/src/did.rs
//! DID derivation (§6): `did:<method>:<base58btc(SHA256(raw_public_key)[:20])>`.

use mandate_types::error::Result;
use mandate_types::ids::Did;

use crate::algorithms::hash::sha256;

/// Derives the kernel's own `"mand"`-method DID for a raw Ed25519 public key.
pub fn derive_did(public_key: &[u8]) -> Result<Did> {
    derive_did_for_method(Did::METHOD, public_key)
}

/// Derives a DID under an arbitrary method name, for callers bridging a
/// foreign identity namespace into the kernel.
pub fn derive_did_for_method(method: &str, public_key: &[u8]) -> Result<Did> {
    let digest = sha256(public_key)?;
    let body = bs58::encode(&digest[..20]).into_string();
    Did::from_parts(method, &body).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_derivation_is_deterministic() {
        let pubkey = [7u8; 32];
        let a = derive_did(&pubkey).unwrap();
        let b = derive_did(&pubkey).unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("did:mand:"));
    }

    #[test]
    fn different_keys_yield_different_dids() {
        let a = derive_did(&[1u8; 32]).unwrap();
        let b = derive_did(&[2u8; 32]).unwrap();
        assert_ne!(a, b);
    }
}
