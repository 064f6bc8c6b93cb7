//! The persistence contract the licensing engine depends on.

use chrono::{DateTime, Utc};
use tollgate_types::{
    License, LicenseId, LicenseStatus, Machine, MachineAttributes, MachineId, Policy, PolicyId,
    Product, ProductId, Tenant, TenantId,
};

use crate::StoreResult;

/// A compare-and-set write of a license's status and expiry.
///
/// It lands only while the stored row still carries the status and expiry
/// the caller read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseTransition {
    pub expected_status: LicenseStatus,
    pub expected_expiry: Option<DateTime<Utc>>,
    pub status: LicenseStatus,
    pub expiry: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

impl LicenseTransition {
    /// An identity transition guarded on `license` as read.
    #[must_use]
    pub fn from_current(license: &License, at: DateTime<Utc>) -> Self {
        Self {
            expected_status: license.status,
            expected_expiry: license.expiry,
            status: license.status,
            expiry: license.expiry,
            at,
        }
    }

    #[must_use]
    pub fn status(mut self, status: LicenseStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn expiry(mut self, expiry: Option<DateTime<Utc>>) -> Self {
        self.expiry = expiry;
        self
    }
}

/// Persistence operations for licensing records.
///
/// Counter fields (`License::uses`, `License::machines_count`) are owned by
/// the atomic operations below. No operation writes back a whole row: each
/// one sets only the columns it owns, and status changes are guarded on the
/// state they were computed from.
///
/// A `limit` of `None` means the update is unguarded.
pub trait Store: Send + Sync {
    fn insert_tenant(&self, tenant: &Tenant) -> StoreResult<()>;
    fn get_tenant(&self, id: TenantId) -> StoreResult<Option<Tenant>>;

    fn insert_product(&self, product: &Product) -> StoreResult<()>;
    fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>>;

    fn insert_policy(&self, policy: &Policy) -> StoreResult<()>;
    fn get_policy(&self, id: PolicyId) -> StoreResult<Option<Policy>>;
    fn update_policy(&self, policy: &Policy) -> StoreResult<()>;

    fn insert_license(&self, license: &License) -> StoreResult<()>;
    fn get_license(&self, id: LicenseId) -> StoreResult<Option<License>>;
    fn find_license_by_key(&self, key: &str) -> StoreResult<Option<License>>;
    /// Applies `change` if the row still matches it. `Ok(None)` means the
    /// license moved on and the caller should re-read.
    fn transition_license(
        &self,
        id: LicenseId,
        change: &LicenseTransition,
    ) -> StoreResult<Option<License>>;
    /// Sets `last_check_in_at` and nothing else.
    fn record_check_in(&self, id: LicenseId, at: DateTime<Utc>) -> StoreResult<License>;
    /// Sets `last_checkout_at` and activates a `NOT_ACTIVATED` license, if
    /// the status is still `expected`.
    fn record_license_checkout(
        &self,
        id: LicenseId,
        expected: LicenseStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<License>>;

    /// Adds `n` to `uses`, failing with `LimitExceeded` if the result would
    /// pass `limit`. Returns the updated license.
    fn increment_uses(&self, id: LicenseId, n: u32, limit: Option<u32>) -> StoreResult<License>;
    /// Subtracts `n` from `uses`, failing with `Underflow` below zero.
    fn decrement_uses(&self, id: LicenseId, n: u32) -> StoreResult<License>;
    fn reset_uses(&self, id: LicenseId) -> StoreResult<License>;

    fn get_machine(&self, id: MachineId) -> StoreResult<Option<Machine>>;
    fn find_machine(
        &self,
        license_id: LicenseId,
        fingerprint: &str,
    ) -> StoreResult<Option<Machine>>;
    fn list_machines(&self, license_id: LicenseId) -> StoreResult<Vec<Machine>>;
    /// Overwrites the attributes set in `attrs`.
    fn update_machine_attributes(
        &self,
        id: MachineId,
        attrs: &MachineAttributes,
    ) -> StoreResult<Machine>;
    /// Sets or clears `last_heartbeat_at`.
    fn set_heartbeat(&self, id: MachineId, at: Option<DateTime<Utc>>) -> StoreResult<Machine>;
    fn record_machine_checkout(&self, id: MachineId, at: DateTime<Utc>) -> StoreResult<Machine>;

    /// Inserts the machine and increments its license's `machines_count` in
    /// one transaction. Returns the updated license.
    fn insert_machine(&self, machine: &Machine, limit: Option<u32>) -> StoreResult<License>;
    /// Re-parents `machine` from `from` to `machine.license_id`, moving one
    /// unit of `machines_count` between the licenses in one transaction.
    /// Returns the new owning license.
    fn move_machine(
        &self,
        machine: &Machine,
        from: LicenseId,
        limit: Option<u32>,
    ) -> StoreResult<License>;
    /// Deletes the machine and decrements its license's `machines_count`.
    /// Returns the updated license.
    fn delete_machine(&self, id: MachineId) -> StoreResult<License>;
}
