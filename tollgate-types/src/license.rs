//! License records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LicenseId, PolicyId, ProductId, TenantId};
use crate::key::LicenseKey;
use crate::Metadata;

wire_enum! {
    /// Stored lifecycle state of a license.
    ///
    /// `Expired` is normally derived from the expiry rather than stored.
    pub enum LicenseStatus {
        NotActivated => "NOT_ACTIVATED",
        Active => "ACTIVE",
        Inactive => "INACTIVE",
        Suspended => "SUSPENDED",
        Expired => "EXPIRED",
        /// Terminal; set administratively.
        Banned => "BANNED",
    }
}

/// Per-license limit overrides applied at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOverrides {
    pub max_machines: Option<u32>,
    pub max_uses: Option<u32>,
    pub max_users: Option<u32>,
}

/// An entitlement bound to one policy and one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: LicenseId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub policy_id: PolicyId,
    pub name: Option<String>,
    pub key: LicenseKey,
    pub status: LicenseStatus,
    pub uses: u32,
    pub machines_count: u32,
    pub max_machines: u32,
    pub max_uses: u32,
    pub max_users: u32,
    /// `None` never expires.
    pub expiry: Option<DateTime<Utc>>,
    pub last_check_in_at: Option<DateTime<Utc>>,
    pub last_checkout_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl License {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| now > expiry)
    }

    #[must_use]
    pub fn is_banned(&self) -> bool {
        self.status == LicenseStatus::Banned
    }
}
