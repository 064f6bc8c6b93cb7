//! Property-based tests for tollgate-crypto.

use std::sync::OnceLock;

use proptest::prelude::*;
use tollgate_crypto::cipher::{open, seal};
use tollgate_crypto::{
    decode, decrypt_with_digest, encode, encrypt_self_keyed, CertificateKind, KeyPair, Scheme,
    SelfKey,
};

fn ed25519_keys() -> &'static KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| Scheme::Ed25519Sign.generate_key_pair().unwrap())
}

fn rsa_keys() -> &'static KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| Scheme::Rsa2048Pkcs1Sha512Sign.generate_key_pair().unwrap())
}

// ============================================================================
// Signing Properties
// ============================================================================

mod signing_properties {
    use super::*;

    proptest! {
        #[test]
        fn ed25519_sign_verify_roundtrip(data in prop::collection::vec(any::<u8>(), 1..1024)) {
            let keys = ed25519_keys();
            let token = Scheme::Ed25519Sign.sign(keys.private_key(), &data).unwrap();
            let verification = Scheme::Ed25519Sign.verify(keys.public_key(), &token).unwrap();
            prop_assert!(verification.valid);
            prop_assert_eq!(verification.data, data);
        }

        #[test]
        fn ed25519_altered_signature_is_invalid(
            data in prop::collection::vec(any::<u8>(), 1..256),
            flip in 0usize..64,
        ) {
            use base64::{engine::general_purpose::STANDARD, Engine};
            let keys = ed25519_keys();
            let token = Scheme::Ed25519Sign.sign(keys.private_key(), &data).unwrap();
            let (sig, rest) = token.split_once('.').unwrap();
            let mut sig = STANDARD.decode(sig).unwrap();
            sig[flip] ^= 0x01;
            let forged = format!("{}.{}", STANDARD.encode(&sig), rest);
            let verification = Scheme::Ed25519Sign.verify(keys.public_key(), &forged).unwrap();
            prop_assert!(!verification.valid);
        }

        #[test]
        fn json_payload_roundtrip(
            id in "[a-z0-9-]{1,36}",
            uses in any::<u32>(),
            suspended in any::<bool>(),
        ) {
            let payload = serde_json::json!({ "id": id, "uses": uses, "suspended": suspended });
            let keys = ed25519_keys();
            let token = Scheme::Ed25519Sign.sign_json(keys.private_key(), &payload).unwrap();
            let decoded: Option<serde_json::Value> =
                Scheme::Ed25519Sign.verify_json(keys.public_key(), &token).unwrap();
            prop_assert_eq!(decoded, Some(payload));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn rsa_sign_verify_roundtrip(data in prop::collection::vec(any::<u8>(), 1..512)) {
            let keys = rsa_keys();
            let token = Scheme::Rsa2048Pkcs1Sha512Sign.sign(keys.private_key(), &data).unwrap();
            let verification = Scheme::Rsa2048Pkcs1Sha512Sign
                .verify(keys.public_key(), &token)
                .unwrap();
            prop_assert!(verification.valid);
            prop_assert_eq!(verification.data, data);
        }
    }
}

// ============================================================================
// Encryption Properties
// ============================================================================

mod encryption_properties {
    use super::*;

    proptest! {
        #[test]
        fn self_keyed_roundtrip(plaintext in ".{0,512}") {
            let (ciphertext, digest) = encrypt_self_keyed(&plaintext).unwrap();
            prop_assert_eq!(decrypt_with_digest(&ciphertext, &digest).unwrap(), plaintext);
        }

        #[test]
        fn digest_is_deterministic(plaintext in prop::collection::vec(any::<u8>(), 0..256)) {
            let a = SelfKey::derive(&plaintext);
            let b = SelfKey::derive(&plaintext);
            prop_assert_eq!(a.digest_hex(), b.digest_hex());
        }

        #[test]
        fn tampering_any_byte_fails(
            plaintext in prop::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
        ) {
            let key = SelfKey::derive(&plaintext);
            let mut sealed = seal(&key, &plaintext).unwrap();
            let i = index.index(sealed.ciphertext.len());
            sealed.ciphertext[i] ^= 0xFF;
            prop_assert!(open(&key, &sealed).is_err());
        }
    }
}

// ============================================================================
// Certificate Properties
// ============================================================================

mod certificate_properties {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn certificate_preserves_token(
            data in prop::collection::vec(any::<u8>(), 1..256),
            encrypted in any::<bool>(),
        ) {
            let keys = ed25519_keys();
            let token = Scheme::Ed25519Sign.sign(keys.private_key(), &data).unwrap();
            let encoded = encode(CertificateKind::License, Scheme::Ed25519Sign, &token, encrypted)
                .unwrap();
            prop_assert_eq!(encoded.digest.is_some(), encrypted);
            let cert = decode(&encoded.text, encoded.digest.as_deref()).unwrap();
            prop_assert_eq!(cert.token(), token);
            prop_assert!(cert.verify(keys.public_key()).unwrap().valid);
        }
    }
}
