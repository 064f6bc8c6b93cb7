//! Ed25519 signing with PKCS#8/SPKI hex-encoded keys.

use base64::engine::general_purpose::STANDARD;
use base64::engine::GeneralPurpose;
use ed25519_dalek::pkcs8::spki::SubjectPublicKeyInfoRef;
use ed25519_dalek::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, PrivateKeyInfo,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::key::KeyPair;
use crate::scheme::SigningScheme;

pub(crate) struct Ed25519Signer;

impl SigningScheme for Ed25519Signer {
    fn generate_key_pair(&self) -> CryptoResult<KeyPair> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let private_der = signing_key
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyGeneration(format!("PKCS#8 encoding failed: {e}")))?;
        let public_der = signing_key
            .verifying_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyGeneration(format!("SPKI encoding failed: {e}")))?;

        Ok(KeyPair::new(
            hex::encode(private_der.as_bytes()),
            hex::encode(public_der.as_bytes()),
        ))
    }

    fn sign(&self, private_key: &str, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let signing_key = decode_signing_key(private_key)?;
        Ok(signing_key.sign(data).to_bytes().to_vec())
    }

    fn verify(&self, public_key: &str, data: &[u8], signature: &[u8]) -> CryptoResult<bool> {
        let verifying_key = decode_verifying_key(public_key)?;
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(verifying_key.verify(data, &signature).is_ok())
    }

    fn token_engine(&self) -> &'static GeneralPurpose {
        &STANDARD
    }
}

fn decode_signing_key(private_key: &str) -> CryptoResult<SigningKey> {
    let der = Zeroizing::new(
        hex::decode(private_key.trim())
            .map_err(|e| CryptoError::KeyDecode(format!("private key is not hex: {e}")))?,
    );

    SigningKey::from_pkcs8_der(&der).map_err(|e| {
        // A well-formed PKCS#8 document under some other algorithm.
        if PrivateKeyInfo::try_from(der.as_slice()).is_ok() {
            CryptoError::KeyTypeMismatch {
                expected: "Ed25519 private key",
            }
        } else {
            CryptoError::KeyDecode(format!("invalid PKCS#8 private key: {e}"))
        }
    })
}

fn decode_verifying_key(public_key: &str) -> CryptoResult<VerifyingKey> {
    let der = hex::decode(public_key.trim())
        .map_err(|e| CryptoError::KeyDecode(format!("public key is not hex: {e}")))?;

    VerifyingKey::from_public_key_der(&der).map_err(|e| {
        if SubjectPublicKeyInfoRef::try_from(der.as_slice()).is_ok() {
            CryptoError::KeyTypeMismatch {
                expected: "Ed25519 public key",
            }
        } else {
            CryptoError::KeyDecode(format!("invalid SPKI public key: {e}"))
        }
    })
}
