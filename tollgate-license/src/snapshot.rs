//! Payloads signed into license and machine certificates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tollgate_crypto::EncodedCertificate;
use tollgate_types::{
    License, LicenseId, LicenseStatus, Machine, MachineId, Metadata, PolicyId, ProductId,
};

/// Issue and expiry of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMeta {
    pub issued: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    /// Seconds between `issued` and `expiry`.
    pub ttl: u64,
}

/// License state as of checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseSnapshot {
    pub id: LicenseId,
    pub product: ProductId,
    pub policy: PolicyId,
    pub name: Option<String>,
    pub key: String,
    /// SHA-256 of the key, hex.
    pub key_checksum: String,
    pub status: LicenseStatus,
    pub uses: u32,
    pub machines_count: u32,
    pub max_machines: u32,
    pub max_uses: u32,
    pub max_users: u32,
    pub expiry: Option<DateTime<Utc>>,
    pub last_check_in: Option<DateTime<Utc>>,
    pub last_checkout: Option<DateTime<Utc>>,
    pub metadata: Metadata,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub meta: CertificateMeta,
}

impl LicenseSnapshot {
    pub(crate) fn new(license: &License, meta: CertificateMeta) -> Self {
        Self {
            id: license.id,
            product: license.product_id,
            policy: license.policy_id,
            name: license.name.clone(),
            key: license.key.to_string(),
            key_checksum: checksum(license.key.as_str()),
            status: license.status,
            uses: license.uses,
            machines_count: license.machines_count,
            max_machines: license.max_machines,
            max_uses: license.max_uses,
            max_users: license.max_users,
            expiry: license.expiry,
            last_check_in: license.last_check_in_at,
            last_checkout: license.last_checkout_at,
            metadata: license.metadata.clone(),
            created: license.created_at,
            updated: license.updated_at,
            meta,
        }
    }
}

/// Machine state as of checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub id: MachineId,
    pub license: LicenseId,
    pub fingerprint: String,
    /// SHA-256 of the fingerprint, hex.
    pub fingerprint_checksum: String,
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub name: Option<String>,
    pub cores: Option<u32>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_checkout: Option<DateTime<Utc>>,
    pub metadata: Metadata,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub meta: CertificateMeta,
}

impl MachineSnapshot {
    pub(crate) fn new(machine: &Machine, meta: CertificateMeta) -> Self {
        Self {
            id: machine.id,
            license: machine.license_id,
            fingerprint: machine.fingerprint.clone(),
            fingerprint_checksum: checksum(&machine.fingerprint),
            ip: machine.ip.clone(),
            hostname: machine.hostname.clone(),
            platform: machine.platform.clone(),
            name: machine.name.clone(),
            cores: machine.cores,
            last_heartbeat: machine.last_heartbeat_at,
            last_checkout: machine.last_checkout_at,
            metadata: machine.metadata.clone(),
            created: machine.created_at,
            updated: machine.updated_at,
            meta,
        }
    }
}

/// Options shared by license and machine checkout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckoutOptions {
    /// Requested lifetime in seconds; clamped to the configured bounds.
    pub ttl: Option<u64>,
    /// Encrypt the certificate. Ignored (always on) when the policy is encrypted.
    pub encrypt: bool,
}

/// A freshly issued certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub certificate: String,
    /// Decryption digest, present when the certificate is encrypted.
    pub digest: Option<String>,
    pub ttl: u64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Checkout {
    pub(crate) fn new(encoded: EncodedCertificate, meta: &CertificateMeta) -> Self {
        Self {
            certificate: encoded.text,
            digest: encoded.digest,
            ttl: meta.ttl,
            issued_at: meta.issued,
            expires_at: meta.expiry,
        }
    }
}

pub(crate) fn checksum(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
