//! Machine activation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LicenseId, MachineId};
use crate::Metadata;

/// A device activated against a license.
///
/// `(license_id, fingerprint)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub license_id: LicenseId,
    pub fingerprint: String,
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub name: Option<String>,
    pub cores: Option<u32>,
    /// `None` when never pinged or after a heartbeat reset.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_checkout_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Machine {
    /// Builds a new, not yet persisted machine.
    #[must_use]
    pub fn new(
        license_id: LicenseId,
        fingerprint: impl Into<String>,
        attrs: MachineAttributes,
    ) -> Self {
        let now = Utc::now();
        let mut machine = Self {
            id: MachineId::new(),
            license_id,
            fingerprint: fingerprint.into(),
            ip: None,
            hostname: None,
            platform: None,
            name: None,
            cores: None,
            last_heartbeat_at: None,
            last_checkout_at: None,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        };
        machine.apply(attrs);
        machine
    }

    /// Overwrites the attributes that are set in `attrs`.
    pub fn apply(&mut self, attrs: MachineAttributes) {
        if attrs.ip.is_some() {
            self.ip = attrs.ip;
        }
        if attrs.hostname.is_some() {
            self.hostname = attrs.hostname;
        }
        if attrs.platform.is_some() {
            self.platform = attrs.platform;
        }
        if attrs.name.is_some() {
            self.name = attrs.name;
        }
        if attrs.cores.is_some() {
            self.cores = attrs.cores;
        }
        if let Some(metadata) = attrs.metadata {
            self.metadata = metadata;
        }
    }
}

/// Free-form machine attributes supplied on activation or update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineAttributes {
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub name: Option<String>,
    pub cores: Option<u32>,
    pub metadata: Option<Metadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_keeps_unset_fields() {
        let mut machine = Machine::new(
            LicenseId::new(),
            "fp-1",
            MachineAttributes {
                hostname: Some("build-01".into()),
                cores: Some(8),
                ..Default::default()
            },
        );
        machine.apply(MachineAttributes {
            ip: Some("10.0.0.2".into()),
            ..Default::default()
        });
        assert_eq!(machine.hostname.as_deref(), Some("build-01"));
        assert_eq!(machine.ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(machine.cores, Some(8));
    }
}
