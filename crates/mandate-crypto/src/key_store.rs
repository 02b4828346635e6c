// Path: crates/mandate-crypto/src/key_store.rs
//! The `KeyStore` capability (§4.1): Ed25519 keygen/sign/verify plus
//! AES-256-GCM sealing of arbitrary bytes under a PBKDF2-HMAC-SHA256
//! derived master key.
//!
//! Sealed blob format: `nonce(12) || ciphertext || auth_tag(16)`. The
//! "encrypted private-key storage string" artifact (§6) is the same
//! ciphertext and tag, just colon-joined and base64-encoded instead of
//! packed, for callers that need a storable string rather than bytes.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashMap;
use mandate_api::capabilities::{KeyAlgorithm, KeyState as CapKeyState};
use mandate_api::crypto::{SerializableKey, Signature, SigningKey, SigningKeyPair, VerifyingKey};
use mandate_types::error::{CryptoError, MandateError, Result};
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::sign::eddsa::{Ed25519KeyPair, Ed25519PrivateKey, Ed25519PublicKey, Ed25519Signature};

const PBKDF2_ITERATIONS: u32 = 100_000;
const MASTER_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Wraps a decrypted secret so it is zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes(pub Vec<u8>);

fn derive_master_key(secret: &str, salt: &str) -> [u8; MASTER_KEY_LEN] {
    let mut key = [0u8; MASTER_KEY_LEN];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt.as_bytes(), PBKDF2_ITERATIONS, &mut key);
    key
}

fn seal_with_key(master_key: &[u8; MASTER_KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(master_key)
        .map_err(|e| CryptoError::SealFailure(format!("bad key length: {e}")))?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext_and_tag = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::SealFailure(format!("AES-GCM encrypt failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext_and_tag.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext_and_tag);
    Ok(out)
}

fn unseal_with_key(master_key: &[u8; MASTER_KEY_LEN], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::SealFailure("sealed blob too short".into()).into());
    }
    let (nonce_bytes, ciphertext_and_tag) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(master_key)
        .map_err(|e| CryptoError::SealFailure(format!("bad key length: {e}")))?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext_and_tag)
        .map_err(|_| CryptoError::SealFailure("AES-GCM decrypt failed (wrong key or tampered blob)".into()).into())
}

/// Encodes a sealed blob's three components as `iv_b64:tag_b64:ciphertext_b64`,
/// the "encrypted private-key storage string" produced artifact (§6).
pub fn to_storage_string(sealed: &[u8]) -> Result<String> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::SealFailure("sealed blob too short".into()).into());
    }
    let (nonce_bytes, rest) = sealed.split_at(NONCE_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);
    Ok(format!(
        "{}:{}:{}",
        BASE64.encode(nonce_bytes),
        BASE64.encode(tag),
        BASE64.encode(ciphertext)
    ))
}

/// Inverse of [`to_storage_string`]: reassembles `nonce || ciphertext || tag`.
pub fn from_storage_string(s: &str) -> Result<Vec<u8>> {
    let mut parts = s.splitn(3, ':');
    let (iv_b64, tag_b64, ct_b64) = match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => {
            return Err(CryptoError::SealFailure(
                "storage string must be iv:tag:ciphertext".into(),
            )
            .into())
        }
    };
    let iv = BASE64
        .decode(iv_b64)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("bad iv base64: {e}")))?;
    let tag = BASE64
        .decode(tag_b64)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("bad tag base64: {e}")))?;
    let ciphertext = BASE64
        .decode(ct_b64)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("bad ciphertext base64: {e}")))?;
    let mut out = Vec::with_capacity(iv.len() + ciphertext.len() + tag.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);
    Ok(out)
}

struct StoredKey {
    keypair: Ed25519KeyPair,
    state: CapKeyState,
}

/// In-memory `KeyStore` implementation. Production deployments front an
/// HSM/KMS behind the same trait; this one holds keys in memory with the
/// sealed form available via [`LocalKeyStore::export_sealed`] for at-rest
/// persistence by the caller.
pub struct LocalKeyStore {
    master_key: [u8; MASTER_KEY_LEN],
    keys: DashMap<String, StoredKey>,
}

impl LocalKeyStore {
    pub fn new(master_key_secret: &str, master_key_salt: &str) -> Self {
        Self {
            master_key: derive_master_key(master_key_secret, master_key_salt),
            keys: DashMap::new(),
        }
    }

    fn get_enabled(&self, key_id: &str) -> Result<dashmap::mapref::one::Ref<'_, String, StoredKey>> {
        let entry = self
            .keys
            .get(key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;
        if entry.state != CapKeyState::Enabled {
            return Err(CryptoError::KeyDisabled(key_id.to_string()).into());
        }
        Ok(entry)
    }

    /// Exports the sealed (AES-256-GCM) form of a private key for at-rest
    /// storage; the in-memory copy is what signs, this is what persists.
    pub fn export_sealed(&self, key_id: &str) -> Result<Vec<u8>> {
        let entry = self
            .keys
            .get(key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;
        let seed = entry.keypair.private_key().to_bytes();
        seal_with_key(&self.master_key, &seed)
    }

    /// Re-imports a key previously exported with [`LocalKeyStore::export_sealed`].
    pub fn import_sealed(&self, key_id: &str, sealed: &[u8]) -> Result<()> {
        let seed = unseal_with_key(&self.master_key, sealed)?;
        let private_key = Ed25519PrivateKey::from_bytes(&seed)?;
        let keypair = Ed25519KeyPair::from_private_key(&private_key)?;
        self.keys.insert(
            key_id.to_string(),
            StoredKey {
                keypair,
                state: CapKeyState::Enabled,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl mandate_api::capabilities::KeyStore for LocalKeyStore {
    async fn generate_keypair(&self) -> Result<(String, Vec<u8>)> {
        let keypair = Ed25519KeyPair::generate()?;
        let public_bytes = keypair.public_key().to_bytes();
        let key_id = uuid::Uuid::new_v4().to_string();
        self.keys.insert(
            key_id.clone(),
            StoredKey {
                keypair,
                state: CapKeyState::Enabled,
            },
        );
        Ok((key_id, public_bytes))
    }

    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>> {
        let entry = self
            .keys
            .get(key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;
        Ok(entry.keypair.public_key().to_bytes())
    }

    async fn key_state(&self, key_id: &str) -> Result<CapKeyState> {
        let entry = self
            .keys
            .get(key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;
        Ok(entry.state)
    }

    async fn set_key_state(&self, key_id: &str, state: CapKeyState) -> Result<()> {
        let mut entry = self
            .keys
            .get_mut(key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;
        entry.state = state;
        Ok(())
    }

    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>> {
        let entry = self.get_enabled(key_id)?;
        let signature = entry.keypair.private_key().sign(message)?;
        Ok(signature.to_bytes())
    }

    async fn verify(&self, key_id: &str, message: &[u8], signature: &[u8]) -> Result<()> {
        let entry = self.get_enabled(key_id)?;
        let sig = Ed25519Signature::from_bytes(signature)?;
        entry
            .keypair
            .public_key()
            .verify(message, &sig)
            .map_err(MandateError::from)
    }

    async fn verify_with_key(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        let key = Ed25519PublicKey::from_bytes(public_key)?;
        let sig = Ed25519Signature::from_bytes(signature)?;
        key.verify(message, &sig).map_err(MandateError::from)
    }

    async fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        seal_with_key(&self.master_key, plaintext)
    }

    async fn unseal(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        unseal_with_key(&self.master_key, sealed)
    }
}

/// The stable algorithm tag this store's keys are produced under.
pub fn algorithm() -> KeyAlgorithm {
    KeyAlgorithm::Ed25519
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandate_api::capabilities::KeyStore as _;

    #[tokio::test]
    async fn seal_roundtrip() {
        let store = LocalKeyStore::new("correct horse battery staple", "a-fixed-salt");
        let sealed = store.seal(b"super secret").await.unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + b"super secret".len() + TAG_LEN);
        let opened = store.unseal(&sealed).await.unwrap();
        assert_eq!(opened, b"super secret");
    }

    #[tokio::test]
    async fn seal_with_wrong_master_key_fails() {
        let store_a = LocalKeyStore::new("secret-a", "salt");
        let store_b = LocalKeyStore::new("secret-b", "salt");
        let sealed = store_a.seal(b"payload").await.unwrap();
        assert!(store_b.unseal(&sealed).await.is_err());
    }

    #[tokio::test]
    async fn storage_string_roundtrip() {
        let store = LocalKeyStore::new("secret", "salt");
        let sealed = store.seal(b"payload").await.unwrap();
        let s = to_storage_string(&sealed).unwrap();
        assert_eq!(s.matches(':').count(), 2);
        let back = from_storage_string(&s).unwrap();
        assert_eq!(back, sealed);
    }

    #[tokio::test]
    async fn sign_and_verify_roundtrip() {
        let store = LocalKeyStore::new("secret", "salt");
        let (key_id, public_key) = store.generate_keypair().await.unwrap();
        let sig = store.sign(&key_id, b"message").await.unwrap();
        store.verify(&key_id, b"message", &sig).await.unwrap();
        store
            .verify_with_key(&public_key, b"message", &sig)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disabled_key_rejects_signing() {
        let store = LocalKeyStore::new("secret", "salt");
        let (key_id, _) = store.generate_keypair().await.unwrap();
        store.set_key_state(&key_id, CapKeyState::Disabled).await.unwrap();
        assert!(store.sign(&key_id, b"message").await.is_err());
    }

    #[tokio::test]
    async fn unknown_key_is_not_found() {
        let store = LocalKeyStore::new("secret", "salt");
        assert!(store.sign("missing", b"message").await.is_err());
    }
}
