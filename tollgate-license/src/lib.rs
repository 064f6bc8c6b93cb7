//! Licensing engine for Tollgate.
//!
//! This crate provides:
//! - A pure policy evaluator (expiry, renewal, overage, check-in, heartbeat)
//! - The license lifecycle engine (create, validate, suspend/reinstate,
//!   renew, usage metering, checkout)
//! - Machine activation and heartbeat tracking
//!
//! Both engines are generic over [`tollgate_store::Store`] and share one
//! store handle.

pub mod config;
mod error;
pub mod evaluator;
mod lifecycle;
mod machines;
mod snapshot;

pub use config::{CheckoutConfig, EngineConfig};
pub use error::{ErrorKind, LicenseError, LicenseResult};
pub use evaluator::{HeartbeatStatus, ScopeMatch, ValidationCode, ValidationResult};
pub use lifecycle::{CreateLicense, LicenseEngine, ValidationScope};
pub use machines::MachineManager;
pub use snapshot::{CertificateMeta, Checkout, CheckoutOptions, LicenseSnapshot, MachineSnapshot};
