//! Signing scheme selection and the `signature.data` token format.
//!
//! A policy names one [`Scheme`]; every sign/verify call goes through it so
//! callers never branch on the algorithm themselves.

use std::fmt;
use std::str::FromStr;

use base64::engine::GeneralPurpose;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::ed25519::Ed25519Signer;
use crate::error::{CryptoError, CryptoResult};
use crate::key::KeyPair;
use crate::rsa_pkcs1::RsaPkcs1Signer;

/// Asymmetric algorithm used to sign certificates for a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// Ed25519 (EdDSA).
    #[serde(rename = "ED25519_SIGN")]
    Ed25519Sign,
    /// RSA-2048, PKCS#1 v1.5 padding over a SHA-512 digest.
    #[serde(rename = "RSA_2048_PKCS1_SHA512_SIGN")]
    Rsa2048Pkcs1Sha512Sign,
}

/// Outcome of verifying a token.
///
/// A bad signature is a result, not an error: `valid` is false and `data`
/// still carries the decoded payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
    pub data: Vec<u8>,
}

impl Verification {
    /// Parses the verified payload as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> CryptoResult<T> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

/// Implemented once per algorithm. Works on raw bytes; token assembly and
/// base64 handling are shared in [`Scheme`].
pub(crate) trait SigningScheme: Send + Sync {
    fn generate_key_pair(&self) -> CryptoResult<KeyPair>;

    fn sign(&self, private_key: &str, data: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Returns `Ok(false)` for a well-formed key and a non-matching signature.
    fn verify(&self, public_key: &str, data: &[u8], signature: &[u8]) -> CryptoResult<bool>;

    /// Base64 alphabet used for both halves of the token.
    fn token_engine(&self) -> &'static GeneralPurpose;
}

impl Scheme {
    /// All supported schemes.
    pub const ALL: [Scheme; 2] = [Scheme::Ed25519Sign, Scheme::Rsa2048Pkcs1Sha512Sign];

    /// Returns the wire name of the scheme.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519Sign => "ED25519_SIGN",
            Self::Rsa2048Pkcs1Sha512Sign => "RSA_2048_PKCS1_SHA512_SIGN",
        }
    }

    fn provider(self) -> &'static dyn SigningScheme {
        match self {
            Self::Ed25519Sign => &Ed25519Signer,
            Self::Rsa2048Pkcs1Sha512Sign => &RsaPkcs1Signer,
        }
    }

    pub(crate) fn token_engine(self) -> &'static GeneralPurpose {
        self.provider().token_engine()
    }

    /// Generates a fresh key pair for this scheme.
    pub fn generate_key_pair(self) -> CryptoResult<KeyPair> {
        self.provider().generate_key_pair()
    }

    /// Signs raw bytes, returning `base64(signature).base64(data)`.
    pub fn sign(self, private_key: &str, data: &[u8]) -> CryptoResult<String> {
        let provider = self.provider();
        let signature = provider.sign(private_key, data)?;
        let engine = provider.token_engine();
        Ok(format!("{}.{}", engine.encode(signature), engine.encode(data)))
    }

    /// JSON-serializes `payload` and signs the resulting bytes.
    pub fn sign_json<T: Serialize>(self, private_key: &str, payload: &T) -> CryptoResult<String> {
        let data = serde_json::to_vec(payload)?;
        self.sign(private_key, &data)
    }

    /// Verifies a `signature.data` token against a public key.
    pub fn verify(self, public_key: &str, token: &str) -> CryptoResult<Verification> {
        let provider = self.provider();
        let engine = provider.token_engine();
        let (signature_b64, data_b64) = split_token(token)?;

        let signature = engine.decode(signature_b64).map_err(|e| {
            CryptoError::InvalidTokenFormat(format!("invalid signature base64: {e}"))
        })?;
        let data = engine
            .decode(data_b64)
            .map_err(|e| CryptoError::InvalidTokenFormat(format!("invalid data base64: {e}")))?;

        let valid = provider.verify(public_key, &data, &signature)?;
        Ok(Verification { valid, data })
    }

    /// Verifies a token and parses its payload as JSON.
    ///
    /// Unlike [`Scheme::verify`], an invalid signature is returned as `None`.
    pub fn verify_json<T: serde::de::DeserializeOwned>(
        self,
        public_key: &str,
        token: &str,
    ) -> CryptoResult<Option<T>> {
        let verification = self.verify(public_key, token)?;
        if !verification.valid {
            return Ok(None);
        }
        verification.json().map(Some)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = CryptoError;

    /// Accepts wire names as well as the short forms `ed25519` and `rsa`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ED25519_SIGN" | "ed25519" | "ED25519" => Ok(Self::Ed25519Sign),
            "RSA_2048_PKCS1_SHA512_SIGN" | "rsa" | "RSA" => Ok(Self::Rsa2048Pkcs1Sha512Sign),
            other => Err(CryptoError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Splits a token into its signature and data halves (still encoded).
pub(crate) fn split_token(token: &str) -> CryptoResult<(&str, &str)> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 2 {
        return Err(CryptoError::InvalidTokenFormat(
            "token must have exactly two parts separated by a dot".to_string(),
        ));
    }
    if parts[0].is_empty() || parts[1].is_empty() {
        return Err(CryptoError::InvalidTokenFormat(
            "token parts must not be empty".to_string(),
        ));
    }
    Ok((parts[0], parts[1]))
}
