//! Error types for the licensing engine.

use thiserror::Error;
use tollgate_crypto::CryptoError;
use tollgate_store::StoreError;
use tollgate_types::{LicenseId, LicenseStatus, MachineId, PolicyId, ProductId, TenantId};

/// Broad failure category, for callers that map errors onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    LimitExceeded,
    InvalidInput,
    Crypto,
    Conflict,
    Storage,
}

impl ErrorKind {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidState => "INVALID_STATE",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Crypto => "CRYPTO_ERROR",
            Self::Conflict => "CONFLICT",
            Self::Storage => "STORAGE_ERROR",
        }
    }
}

/// Licensing-specific errors.
///
/// Business outcomes such as "license is overdue" are reported through
/// [`crate::ValidationResult`], not here.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// No tenant with this id.
    #[error("tenant not found: {0}")]
    InvalidTenant(TenantId),

    /// No product with this id under the tenant.
    #[error("product not found: {0}")]
    InvalidProduct(ProductId),

    /// No policy with this id under the product.
    #[error("policy not found: {0}")]
    InvalidPolicy(PolicyId),

    /// Unknown license id or key.
    #[error("license not found: {0}")]
    InvalidLicense(String),

    /// No machine with this id.
    #[error("machine not found: {0}")]
    MachineNotFound(MachineId),

    /// The operation needs a license that has been checked out at least once.
    #[error("license has not been activated")]
    NotActivated,

    /// The status machine does not allow this move.
    #[error("cannot move license from {from} to {to}")]
    InvalidTransition {
        from: LicenseStatus,
        to: LicenseStatus,
    },

    /// The license is suspended.
    #[error("license is suspended")]
    LicenseSuspended,

    /// The license is banned.
    #[error("license is banned")]
    LicenseBanned,

    /// The license is past its expiry.
    #[error("license is expired")]
    LicenseExpired,

    /// A usage increment would pass the usage limit.
    #[error("max uses exceeded (max {max})")]
    MaxUsesExceeded { max: u32 },

    /// An activation or move would pass the machine limit.
    #[error("machine limit exceeded (max {max} machines)")]
    MaxMachineExceeded { max: u32 },

    /// A decrement larger than the recorded uses.
    #[error("cannot decrement uses by {n}: only {uses} recorded")]
    InvalidDecrement { uses: u32, n: u32 },

    /// An expiry that is in the past or out of range.
    #[error("invalid expiry: {0}")]
    InvalidExpiry(String),

    /// The fingerprint is already activated on the target license.
    #[error("fingerprint already associated with this license")]
    FingerprintAlreadyAssociated,

    /// Engine configuration outside its allowed bounds.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Concurrent writers kept changing the license under this operation.
    #[error("license {0} is being modified concurrently")]
    Contended(LicenseId),

    /// Signing, verification or certificate codec failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LicenseError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTenant(_)
            | Self::InvalidProduct(_)
            | Self::InvalidPolicy(_)
            | Self::InvalidLicense(_)
            | Self::MachineNotFound(_) => ErrorKind::NotFound,
            Self::NotActivated
            | Self::InvalidTransition { .. }
            | Self::LicenseSuspended
            | Self::LicenseBanned
            | Self::LicenseExpired => ErrorKind::InvalidState,
            Self::MaxUsesExceeded { .. } | Self::MaxMachineExceeded { .. } => {
                ErrorKind::LimitExceeded
            }
            Self::InvalidDecrement { .. } | Self::InvalidExpiry(_) | Self::InvalidConfig(_) => {
                ErrorKind::InvalidInput
            }
            Self::Crypto(CryptoError::UnsupportedScheme(_)) => ErrorKind::InvalidInput,
            Self::Crypto(_) => ErrorKind::Crypto,
            Self::FingerprintAlreadyAssociated | Self::Contended(_) => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTenant(_) => "TENANT_NOT_FOUND",
            Self::InvalidProduct(_) => "PRODUCT_NOT_FOUND",
            Self::InvalidPolicy(_) => "POLICY_NOT_FOUND",
            Self::InvalidLicense(_) => "LICENSE_NOT_FOUND",
            Self::MachineNotFound(_) => "MACHINE_NOT_FOUND",
            Self::NotActivated => "LICENSE_NOT_ACTIVATED",
            Self::InvalidTransition { .. } => "LICENSE_INVALID_TRANSITION",
            Self::LicenseSuspended => "LICENSE_SUSPENDED",
            Self::LicenseBanned => "LICENSE_BANNED",
            Self::LicenseExpired => "LICENSE_EXPIRED",
            Self::MaxUsesExceeded { .. } => "LICENSE_USAGE_EXCEEDED",
            Self::MaxMachineExceeded { .. } => "MACHINE_LIMIT_EXCEEDED",
            Self::InvalidDecrement { .. } => "LICENSE_INVALID_DECREMENT",
            Self::InvalidExpiry(_) => "LICENSE_INVALID_EXPIRY",
            Self::FingerprintAlreadyAssociated => "MACHINE_FINGERPRINT_TAKEN",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Contended(_) => "LICENSE_CONTENDED",
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
