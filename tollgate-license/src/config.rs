//! Engine configuration parsed from TOML.
//!
//! ```toml
//! [checkout]
//! minimum_ttl = 3600
//! maximum_ttl = 31536000
//! default_ttl = 2592000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{LicenseError, LicenseResult};

/// Shortest certificate lifetime, in seconds (1 hour).
pub const MINIMUM_TTL: u64 = 60 * 60;

/// Longest certificate lifetime, in seconds (1 year).
pub const MAXIMUM_TTL: u64 = 365 * 24 * 60 * 60;

/// Lifetime used when checkout does not ask for one (30 days).
pub const DEFAULT_TTL: u64 = 30 * 24 * 60 * 60;

/// Certificate TTL bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default = "default_minimum_ttl")]
    pub minimum_ttl: u64,
    #[serde(default = "default_maximum_ttl")]
    pub maximum_ttl: u64,
    #[serde(default = "default_ttl")]
    pub default_ttl: u64,
}

fn default_minimum_ttl() -> u64 {
    MINIMUM_TTL
}

fn default_maximum_ttl() -> u64 {
    MAXIMUM_TTL
}

fn default_ttl() -> u64 {
    DEFAULT_TTL
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            minimum_ttl: MINIMUM_TTL,
            maximum_ttl: MAXIMUM_TTL,
            default_ttl: DEFAULT_TTL,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub checkout: CheckoutConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> LicenseResult<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| LicenseError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> LicenseResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LicenseError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&contents)?;
        info!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Checks that `minimum_ttl <= default_ttl <= maximum_ttl`.
    pub fn validate(&self) -> LicenseResult<()> {
        let c = &self.checkout;
        if c.minimum_ttl == 0 {
            return Err(LicenseError::InvalidConfig(
                "checkout.minimum_ttl must be positive".to_string(),
            ));
        }
        if c.minimum_ttl > c.maximum_ttl {
            return Err(LicenseError::InvalidConfig(format!(
                "checkout.minimum_ttl ({}) exceeds checkout.maximum_ttl ({})",
                c.minimum_ttl, c.maximum_ttl
            )));
        }
        if !(c.minimum_ttl..=c.maximum_ttl).contains(&c.default_ttl) {
            return Err(LicenseError::InvalidConfig(format!(
                "checkout.default_ttl ({}) must lie within [{}, {}]",
                c.default_ttl, c.minimum_ttl, c.maximum_ttl
            )));
        }
        Ok(())
    }
}
