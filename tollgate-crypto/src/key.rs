//! Encoded key material.
//!
//! Keys travel as text so the persistence layer can store them verbatim:
//! - Ed25519: PKCS#8 DER (private) and SPKI DER (public), hex-encoded.
//! - RSA: PKCS#1 PEM, URL-safe base64-encoded.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A generated key pair with automatic zeroization of the private half.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    private_key: String,
    #[zeroize(skip)]
    public_key: String,
}

impl KeyPair {
    /// Wraps already-encoded key material.
    pub fn new(private_key: String, public_key: String) -> Self {
        Self {
            private_key,
            public_key,
        }
    }

    /// Returns the encoded private key.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Returns the encoded public key.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .finish()
    }
}
