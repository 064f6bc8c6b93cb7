//! Self-keyed certificate encryption using AES-256-GCM.
//!
//! The key is the SHA-256 digest of the plaintext itself. Whoever holds the
//! certificate *and* the digest can decrypt it, so this is obfuscation for
//! transit, not confidentiality against the certificate holder.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// AES-256 key length; also the SHA-256 digest length.
pub const KEY_SIZE: usize = 32;

/// GCM nonce length.
pub const NONCE_SIZE: usize = 12;

/// GCM tag length, appended to every ciphertext.
pub const TAG_SIZE: usize = 16;

/// A key derived from the plaintext it protects.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SelfKey([u8; KEY_SIZE]);

impl SelfKey {
    /// SHA-256 of `plaintext`.
    pub fn derive(plaintext: &[u8]) -> Self {
        Self(Sha256::digest(plaintext).into())
    }

    /// Rebuilds a key from the hex digest handed out alongside a certificate.
    pub fn from_digest_hex(digest: &str) -> CryptoResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        hex::decode_to_slice(digest.trim(), &mut bytes).map_err(|e| {
            CryptoError::Decryption(format!("digest must be {KEY_SIZE} hex-encoded bytes: {e}"))
        })?;
        Ok(Self(bytes))
    }

    /// Lowercase hex form, as surfaced to the caller.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(&self.0.into())
    }
}

impl std::fmt::Debug for SelfKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SelfKey([REDACTED])")
    }
}

/// A sealed certificate body: the nonce and the tagged ciphertext.
///
/// On the wire this is `base64(nonce || ciphertext)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBody {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl SealedBody {
    pub fn encode(&self) -> String {
        STANDARD.encode([self.nonce.as_slice(), self.ciphertext.as_slice()].concat())
    }

    pub fn parse(encoded: &str) -> CryptoResult<Self> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Decryption(format!("sealed body is not base64: {e}")))?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "sealed body is {} bytes, need at least {}",
                raw.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
        let mut body = Self {
            nonce: [0u8; NONCE_SIZE],
            ciphertext: ciphertext.to_vec(),
        };
        body.nonce.copy_from_slice(nonce);
        Ok(body)
    }
}

/// Seals `plaintext` under `key` with a fresh random nonce.
pub fn seal(key: &SelfKey, plaintext: &[u8]) -> CryptoResult<SealedBody> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    Ok(SealedBody { nonce, ciphertext })
}

/// Opens a sealed body. Fails on a wrong key or any tampering.
pub fn open(key: &SelfKey, body: &SealedBody) -> CryptoResult<Vec<u8>> {
    key.cipher()
        .decrypt(Nonce::from_slice(&body.nonce), body.ciphertext.as_slice())
        .map_err(|_| CryptoError::Decryption("wrong digest or tampered certificate".to_string()))
}

/// Encrypts a string under its own digest.
///
/// Returns `(base64 sealed body, hex digest)`.
pub fn encrypt_self_keyed(plaintext: &str) -> CryptoResult<(String, String)> {
    let key = SelfKey::derive(plaintext.as_bytes());
    let body = seal(&key, plaintext.as_bytes())?;
    Ok((body.encode(), key.digest_hex()))
}

/// Reverses [`encrypt_self_keyed`] given the digest.
pub fn decrypt_with_digest(encoded: &str, digest: &str) -> CryptoResult<String> {
    let key = SelfKey::from_digest_hex(digest)?;
    let plaintext = open(&key, &SealedBody::parse(encoded)?)?;
    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::Decryption(format!("decrypted body is not UTF-8: {e}")))
}
