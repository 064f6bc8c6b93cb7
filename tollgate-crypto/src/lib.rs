//! Signing schemes and certificate encoding for Tollgate.
//!
//! This crate handles:
//! - Key-pair generation, signing and verification for two interchangeable
//!   schemes: Ed25519 and RSA-2048 PKCS#1 v1.5 over SHA-512
//! - The `base64(signature).base64(data)` token format
//! - Certificate text (`BEGIN/END <KIND> FILE`), optionally encrypted with a
//!   key derived from its own contents
//!
//! # Key Encoding
//!
//! - Ed25519: hex PKCS#8 private keys, hex SPKI public keys
//! - RSA: URL-safe base64 of PKCS#1 PEM, for both halves
//!
//! Nothing here holds state; policies own their keys and pass them in.

pub mod certificate;
pub mod cipher;
mod ed25519;
mod error;
mod key;
mod rsa_pkcs1;
mod scheme;

pub use certificate::{decode, encode, Certificate, CertificateKind, EncodedCertificate};
pub use cipher::{decrypt_with_digest, encrypt_self_keyed, SealedBody, SelfKey};
pub use error::{CryptoError, CryptoResult};
pub use key::KeyPair;
pub use rsa_pkcs1::RSA_KEY_BITS;
pub use scheme::{Scheme, Verification};
