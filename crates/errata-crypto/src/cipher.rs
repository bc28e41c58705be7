//! AES-256-GCM sealing of small secrets (user OpenRouter keys).
//!
//! Sealed format: `base64(nonce[12] || ciphertext || tag[16])`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Generate cryptographically secure random bytes.
pub fn generate_random<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Symmetric cipher holding the server's secret-sealing key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApiKeyCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for ApiKeyCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl ApiKeyCipher {
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Parse a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let mut raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("not base64: {}", e)))?;
        if raw.len() != 32 {
            let len = raw.len();
            raw.zeroize();
            return Err(CryptoError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                len
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&raw);
        raw.zeroize();
        Ok(Self { key })
    }

    /// A random key. Secrets sealed with it do not survive a restart.
    pub fn generate() -> Self {
        Self {
            key: generate_random(),
        }
    }

    /// The key as base64, for printing into a `.env` file.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.key)
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &str) -> CryptoResult<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        let nonce_bytes: [u8; NONCE_LEN] = generate_random();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encryption("AES-GCM encryption failed".into()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypt a value produced by [`ApiKeyCipher::seal`].
    pub fn open(&self, sealed: &str) -> CryptoResult<String> {
        let raw = STANDARD
            .decode(sealed.trim())
            .map_err(|e| CryptoError::InvalidFormat(format!("not base64: {}", e)))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::InvalidFormat("sealed value too short".into()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| CryptoError::Decryption("Invalid key".to_string()))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decryption("AES-GCM decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Decryption("plaintext is not UTF-8".to_string()))
    }
}
