//! Core record types for Tollgate.
//!
//! This crate defines the records the licensing engine reads and writes:
//! - Tenant, product, policy, license and machine identifiers (UUID v7)
//! - The records themselves and their strategy enums
//! - License key generation
//!
//! Behaviour lives in `tollgate-license`; these are plain data.

#[macro_use]
mod wire;

mod ids;
mod key;
mod license;
mod machine;
mod policy;
mod tenant;

pub use ids::{LicenseId, MachineId, PolicyId, ProductId, TenantId};
pub use key::{LicenseKey, KEY_LENGTH};
pub use license::{License, LicenseStatus, LimitOverrides};
pub use machine::{Machine, MachineAttributes};
pub use policy::{
    CheckInInterval, ExpirationBasis, ExpirationStrategy, HeartbeatBasis, HeartbeatCullStrategy,
    HeartbeatResurrectionStrategy, OverageStrategy, Policy, RenewalBasis,
    DEFAULT_HEARTBEAT_DURATION,
};
pub use tenant::{Product, Tenant};

/// Free-form JSON attached to records.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
