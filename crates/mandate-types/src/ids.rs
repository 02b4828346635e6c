// Path: crates/mandate-types/src/ids.rs
//! Identifier newtypes shared across the kernel.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// A decentralized identifier of the form `did:<method>:<base58btc(...)>`.
///
/// Equivalent to the regex `^did:[a-z0-9]+:[1-9A-HJ-NP-Za-km-z]+$`
/// (base58btc alphabet, i.e. no `0`, `O`, `I`, or `l`), checked by hand
/// below rather than pulling in a regex engine for one pattern. The
/// kernel's own method is `"mand"`, but foreign-method DIDs are accepted
/// as opaque identifiers wherever a DID is merely referenced rather than
/// resolved locally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

fn is_base58_char(c: char) -> bool {
    c.is_ascii_alphanumeric() && c != '0' && c != 'O' && c != 'I' && c != 'l'
}

fn looks_like_did(raw: &str) -> bool {
    let Some(rest) = raw.strip_prefix("did:") else {
        return false;
    };
    let Some((method, body)) = rest.split_once(':') else {
        return false;
    };
    !method.is_empty()
        && method.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && !body.is_empty()
        && body.chars().all(is_base58_char)
}

impl Did {
    pub const METHOD: &'static str = "mand";

    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if !looks_like_did(&raw) {
            return Err(ValidationError::InvalidDid(raw));
        }
        Ok(Self(raw))
    }

    /// Builds a DID from a method name and the base58btc-encoded identifier
    /// body. Does not itself compute the hash; see `mandate-crypto::did`.
    pub fn from_parts(method: &str, body: &str) -> Result<Self, ValidationError> {
        Self::parse(format!("did:{method}:{body}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn method(&self) -> &str {
        self.0
            .splitn(3, ':')
            .nth(1)
            .unwrap_or_default()
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque agent record identifier, distinct from its DID (the DID is
/// derived from the keypair; the record id is a stable database handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub uuid::Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub uuid::Uuid);

impl TokenId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(pub uuid::Uuid);

impl PolicyId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PolicyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Organization identifier. Plain opaque string (orgs are not minted by this
/// crate; they're provisioned by whatever system owns tenancy).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(pub String);

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_did() {
        assert!(Did::parse("did:mand:3yQ3P8V7s4RexPuZ7cfjJb").is_ok());
    }

    #[test]
    fn rejects_malformed_did() {
        assert!(Did::parse("not-a-did").is_err());
        assert!(Did::parse("did:MAND:abc").is_err()); // uppercase method
        assert!(Did::parse("did:mand:0Il").is_err()); // invalid base58 chars
    }

    #[test]
    fn method_extraction() {
        let did = Did::parse("did:mand:3yQ3P8V7s4RexPuZ7cfjJb").unwrap();
        assert_eq!(did.method(), "mand");
    }
}
