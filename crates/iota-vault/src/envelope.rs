use crate::error::{VaultError, VaultResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce as AesNonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroizing;

// AES-256-GCM envelope encryption.
//
// The key is supplied by the caller on every request and never persisted.
// The nonce is random per encryption and stored in front of the ciphertext:
//
//   nonce (12 bytes) || ciphertext || GCM tag (16 bytes)

pub const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Symmetric key for the global config, zeroized on drop.
pub struct ConfigKey(Zeroizing<[u8; KEY_SIZE]>);

impl ConfigKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Decode a standard-alphabet base64 key. Anything other than exactly
    /// 32 decoded bytes is rejected.
    pub fn from_base64(encoded: &str) -> VaultResult<Self> {
        let decoded = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|_| VaultError::InvalidKey("not valid base64".into()))?,
        );
        if decoded.len() != KEY_SIZE {
            return Err(VaultError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_SIZE,
                decoded.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&decoded);
        Ok(Self(key))
    }

    /// Generate a fresh random key (used by `iota init`).
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        rand::rngs::OsRng.fill_bytes(&mut *key);
        Self(key)
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(&*self.0))
    }

    fn cipher(&self) -> VaultResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&*self.0)
            .map_err(|e| VaultError::Encryption(format!("cipher init failed: {}", e)))
    }
}

impl std::fmt::Debug for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConfigKey(***)")
    }
}

/// Encrypted envelope: nonce + ciphertext (includes GCM tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Serialize to the on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split a stored blob back into nonce and ciphertext. A blob too short
    /// to hold a nonce and a tag cannot have come from `encrypt`.
    pub fn from_bytes(bytes: &[u8]) -> VaultResult<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(VaultError::Decryption);
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(nonce_bytes);
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Encrypt plaintext using AES-256-GCM with the given key.
pub fn encrypt(key: &ConfigKey, plaintext: &[u8]) -> VaultResult<EncryptedEnvelope> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = AesNonce::from_slice(&nonce_bytes);

    let ciphertext = key
        .cipher()?
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::Encryption(format!("encryption failed: {}", e)))?;

    Ok(EncryptedEnvelope {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt an envelope. Any authentication failure is `Decryption`.
pub fn decrypt(key: &ConfigKey, envelope: &EncryptedEnvelope) -> VaultResult<Zeroizing<Vec<u8>>> {
    let nonce = AesNonce::from_slice(&envelope.nonce);
    key.cipher()?
        .decrypt(nonce, envelope.ciphertext.as_ref())
        .map(Zeroizing::new)
        .map_err(|_| VaultError::Decryption)
}

/// Encrypt straight to the stored byte layout.
pub fn seal(key: &ConfigKey, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
    encrypt(key, plaintext).map(|env| env.to_bytes())
}

/// Decrypt a blob in the stored byte layout.
pub fn open(key: &ConfigKey, blob: &[u8]) -> VaultResult<Zeroizing<Vec<u8>>> {
    decrypt(key, &EncryptedEnvelope::from_bytes(blob)?)
}
