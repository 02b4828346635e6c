// Path: crates/mandate-audit/src/merkle.rs

//! Periodic Merkle roll-ups over committed audit ranges (§4.7). A root
//! lets an organization anchor its ledger externally (or simply compress
//! years of entries into one signed checkpoint) without re-verifying every
//! entry hash back to sequence 1.

use std::sync::Arc;

use mandate_api::capabilities::{Clock, KeyStore, Storage};
use mandate_crypto::algorithms::hash::sha256;
use mandate_types::audit::MerkleRoot;
use mandate_types::error::Result;

/// Folds `leaves` pairwise with SHA-256 until one hash remains, duplicating
/// the last leaf of an odd-sized level rather than carrying it up unpaired.
/// Returns the zero hash for an empty leaf set.
pub fn merkle_root(leaves: &[[u8; 32]]) -> Result<[u8; 32]> {
    if leaves.is_empty() {
        return Ok([0u8; 32]);
    }
    let mut level: Vec<[u8; 32]> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let left = pair.first().copied().unwrap_or([0u8; 32]);
            let right = pair.get(1).copied().unwrap_or(left);
            let mut buf = Vec::with_capacity(64);
            buf.extend_from_slice(&left);
            buf.extend_from_slice(&right);
            next.push(sha256(&buf)?);
        }
        level = next;
    }
    Ok(level.first().copied().unwrap_or([0u8; 32]))
}

pub struct MerkleService {
    storage: Arc<dyn Storage>,
    key_store: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
    signing_key_id: String,
}

impl MerkleService {
    pub fn new(storage: Arc<dyn Storage>, key_store: Arc<dyn KeyStore>, clock: Arc<dyn Clock>, signing_key_id: String) -> Self {
        Self { storage, key_store, clock, signing_key_id }
    }

    /// Rolls up every entry committed since the last anchored root, or
    /// `Ok(None)` if nothing new has landed.
    pub async fn roll_up(&self, organization_id: &str) -> Result<Option<MerkleRoot>> {
        let latest_sequence = self.storage.latest_audit_sequence(organization_id).await?;
        let existing = self.storage.list_merkle_roots(organization_id).await?;
        let start_sequence = existing.iter().map(|r| r.end_sequence).max().unwrap_or(0) + 1;
        if start_sequence > latest_sequence {
            return Ok(None);
        }
        let entries = self
            .storage
            .get_audit_entries_range(organization_id, start_sequence, latest_sequence)
            .await?;
        let leaves: Vec<[u8; 32]> = entries.iter().map(|e| e.entry_hash).collect();
        let root_hash = merkle_root(&leaves)?;
        let signature = self.key_store.sign(&self.signing_key_id, &root_hash).await?;
        let root = MerkleRoot {
            organization_id: organization_id.to_string(),
            root_hash,
            start_sequence,
            end_sequence: latest_sequence,
            entry_count: entries.len() as u64,
            signature,
            anchored_to: None,
            anchored_at: None,
            anchor_tx_hash: None,
            created_at: self.clock.now(),
        };
        self.storage.put_merkle_root(&root).await?;
        Ok(Some(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> [u8; 32] {
        let mut h = [0u8; 32];
        if let Some(first) = h.first_mut() {
            *first = byte;
        }
        h
    }

    #[test]
    fn empty_leaves_yield_zero_root() {
        assert_eq!(merkle_root(&[]).unwrap(), [0u8; 32]);
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = leaf(7);
        assert_eq!(merkle_root(&[l]).unwrap(), l);
    }

    #[test]
    fn odd_leaf_count_duplicates_last_leaf() {
        let leaves = vec![leaf(1), leaf(2), leaf(3)];
        let with_duplicate = vec![leaf(1), leaf(2), leaf(3), leaf(3)];
        assert_eq!(merkle_root(&leaves).unwrap(), merkle_root(&with_duplicate).unwrap());
    }

    #[test]
    fn different_leaf_sets_produce_different_roots() {
        let a = merkle_root(&[leaf(1), leaf(2)]).unwrap();
        let b = merkle_root(&[leaf(1), leaf(3)]).unwrap();
        assert_ne!(a, b);
    }
}
