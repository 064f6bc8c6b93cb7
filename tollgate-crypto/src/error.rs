//! Error types for the signing and certificate layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors from key handling, signing and certificate decoding.
///
/// A signature that does not match is not an error; see
/// [`crate::Verification`].
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material could not be decoded (bad hex/base64, bad DER or PEM).
    #[error("key decode failed: {0}")]
    KeyDecode(String),

    /// Key decoded cleanly but is not the kind the scheme expects.
    #[error("key type mismatch: expected {expected}")]
    KeyTypeMismatch { expected: &'static str },

    /// Signed token is not `signature.data`.
    #[error("invalid token format: {0}")]
    InvalidTokenFormat(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (wrong digest or tampered data).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Certificate text is malformed.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
