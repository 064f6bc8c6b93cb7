//! Portable certificate text for offline verification.
//!
//! A signed `signature.data` token is wrapped as
//! `{"enc": data, "sig": signature, "alg": scheme}`, JSON-serialized and
//! base64-encoded. When encryption is requested the base64 string is
//! encrypted under its own SHA-256 digest (see [`crate::cipher`]) and the
//! digest is returned to the caller. The result is framed as:
//!
//! ```text
//! -----BEGIN LICENSE FILE-----
//! <base64>
//! -----END LICENSE FILE-----
//! ```

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::cipher::{decrypt_with_digest, encrypt_self_keyed};
use crate::error::{CryptoError, CryptoResult};
use crate::scheme::{split_token, Scheme, Verification};

/// What a certificate describes; selects the envelope label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateKind {
    License,
    Machine,
}

impl CertificateKind {
    /// Label used in the `BEGIN`/`END` lines.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::License => "LICENSE",
            Self::Machine => "MACHINE",
        }
    }

    fn header(self) -> String {
        format!("-----BEGIN {} FILE-----", self.label())
    }

    fn footer(self) -> String {
        format!("-----END {} FILE-----", self.label())
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "LICENSE" => Some(Self::License),
            "MACHINE" => Some(Self::Machine),
            _ => None,
        }
    }
}

impl fmt::Display for CertificateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    enc: String,
    sig: String,
    alg: Scheme,
}

/// Certificate text plus the decryption digest, when one was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCertificate {
    pub text: String,
    pub digest: Option<String>,
}

/// A decoded (but not yet verified) certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub kind: CertificateKind,
    pub alg: Scheme,
    /// Encoded payload (the `data` half of the token).
    pub enc: String,
    /// Encoded signature.
    pub sig: String,
}

impl Certificate {
    /// Reassembles the `signature.data` token.
    #[must_use]
    pub fn token(&self) -> String {
        format!("{}.{}", self.sig, self.enc)
    }

    /// Verifies the embedded signature with the issuing policy's public key.
    pub fn verify(&self, public_key: &str) -> CryptoResult<Verification> {
        self.alg.verify(public_key, &self.token())
    }

    /// Decodes the payload without checking the signature.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> CryptoResult<T> {
        let data = self.alg.token_engine().decode(&self.enc).map_err(|e| {
            CryptoError::InvalidCertificate(format!("invalid payload base64: {e}"))
        })?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Encodes a signed token as certificate text.
pub fn encode(
    kind: CertificateKind,
    scheme: Scheme,
    token: &str,
    encrypt: bool,
) -> CryptoResult<EncodedCertificate> {
    let (sig, enc) = split_token(token)?;
    let envelope = Envelope {
        enc: enc.to_string(),
        sig: sig.to_string(),
        alg: scheme,
    };
    let encoded = STANDARD.encode(serde_json::to_vec(&envelope)?);

    let (body, digest) = if encrypt {
        let (ciphertext, digest) = encrypt_self_keyed(&encoded)?;
        (ciphertext, Some(digest))
    } else {
        (encoded, None)
    };

    Ok(EncodedCertificate {
        text: format!("{}\n{}\n{}", kind.header(), body, kind.footer()),
        digest,
    })
}

/// Parses certificate text. `digest` is required for encrypted certificates.
pub fn decode(text: &str, digest: Option<&str>) -> CryptoResult<Certificate> {
    let (kind, body) = unwrap_envelope(text)?;

    let encoded = match digest {
        Some(digest) => decrypt_with_digest(&body, digest)?,
        None => body,
    };

    let json = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| CryptoError::InvalidCertificate(format!("invalid base64 body: {e}")))?;

    let envelope: Envelope = match serde_json::from_slice(&json) {
        Ok(envelope) => envelope,
        Err(_) if digest.is_none() => {
            return Err(CryptoError::Decryption(
                "certificate body is not an envelope; it may be encrypted".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Certificate {
        kind,
        alg: envelope.alg,
        enc: envelope.enc,
        sig: envelope.sig,
    })
}

fn unwrap_envelope(text: &str) -> CryptoResult<(CertificateKind, String)> {
    let mut lines = text.trim().lines().map(str::trim);

    let header = lines
        .next()
        .ok_or_else(|| CryptoError::InvalidCertificate("empty certificate".to_string()))?;
    let label = header
        .strip_prefix("-----BEGIN ")
        .and_then(|rest| rest.strip_suffix(" FILE-----"))
        .ok_or_else(|| CryptoError::InvalidCertificate(format!("bad header: {header}")))?;
    let kind = CertificateKind::from_label(label)
        .ok_or_else(|| CryptoError::InvalidCertificate(format!("unknown kind: {label}")))?;

    let footer = kind.footer();
    let mut body = String::new();
    let mut closed = false;
    for line in lines {
        if line == footer {
            closed = true;
            break;
        }
        body.push_str(line);
    }

    if !closed {
        return Err(CryptoError::InvalidCertificate(format!("missing footer: {footer}")));
    }
    if body.is_empty() {
        return Err(CryptoError::InvalidCertificate("empty body".to_string()));
    }
    Ok((kind, body))
}
