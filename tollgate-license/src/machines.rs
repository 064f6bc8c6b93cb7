//! Machine activation, re-parenting, checkout and heartbeats.

use std::sync::Arc;

use chrono::Utc;
use tollgate_crypto::CertificateKind;
use tollgate_store::{Store, StoreError};
use tollgate_types::{
    License, LicenseId, LicenseStatus, Machine, MachineAttributes, MachineId, Policy,
};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::evaluator::{self, HeartbeatStatus};
use crate::snapshot::{CertificateMeta, Checkout, CheckoutOptions, MachineSnapshot};

/// Activates machines against licenses and tracks their heartbeats.
///
/// Heartbeat culling is not scheduled here; [`MachineManager::heartbeat_status`]
/// reports liveness and callers decide what to do with dead machines.
pub struct MachineManager<S> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: Store> MachineManager<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn get_machine(&self, id: MachineId) -> LicenseResult<Machine> {
        self.store
            .get_machine(id)?
            .ok_or(LicenseError::MachineNotFound(id))
    }

    pub fn list_machines(&self, license_id: LicenseId) -> LicenseResult<Vec<Machine>> {
        Ok(self.store.list_machines(license_id)?)
    }

    fn license_by_key(&self, key: &str) -> LicenseResult<License> {
        self.store
            .find_license_by_key(key)?
            .ok_or_else(|| LicenseError::InvalidLicense(key.to_string()))
    }

    fn license(&self, id: LicenseId) -> LicenseResult<License> {
        self.store
            .get_license(id)?
            .ok_or_else(|| LicenseError::InvalidLicense(id.to_string()))
    }

    fn policy_for(&self, license: &License) -> LicenseResult<Policy> {
        self.store
            .get_policy(license.policy_id)?
            .ok_or(LicenseError::InvalidPolicy(license.policy_id))
    }

    /// Rejects licenses that cannot take new machines.
    fn ensure_usable(license: &License) -> LicenseResult<()> {
        match evaluator::effective_status(license, Utc::now()) {
            LicenseStatus::Suspended => Err(LicenseError::LicenseSuspended),
            LicenseStatus::Banned => Err(LicenseError::LicenseBanned),
            LicenseStatus::Expired => Err(LicenseError::LicenseExpired),
            _ => Ok(()),
        }
    }

    fn map_slot_error(err: StoreError, license: &License) -> LicenseError {
        match err {
            StoreError::LimitExceeded { limit, .. } => {
                warn!(license_id = %license.id, max = limit, "Machine limit exceeded");
                LicenseError::MaxMachineExceeded { max: limit }
            }
            StoreError::Conflict(_) => LicenseError::FingerprintAlreadyAssociated,
            other => other.into(),
        }
    }

    // ── Activation ───────────────────────────────────────────────

    /// Activates `fingerprint` against the license with `license_key`.
    pub fn activate(
        &self,
        license_key: &str,
        fingerprint: &str,
        attrs: MachineAttributes,
    ) -> LicenseResult<Machine> {
        let license = self.license_by_key(license_key)?;
        Self::ensure_usable(&license)?;
        let policy = self.policy_for(&license)?;

        if self.store.find_machine(license.id, fingerprint)?.is_some() {
            return Err(LicenseError::FingerprintAlreadyAssociated);
        }

        let machine = Machine::new(license.id, fingerprint, attrs);
        let limit = evaluator::machine_limit(&policy, &license);
        let updated = self
            .store
            .insert_machine(&machine, limit)
            .map_err(|e| Self::map_slot_error(e, &license))?;

        info!(
            machine_id = %machine.id,
            license_id = %license.id,
            machines_count = updated.machines_count,
            "Machine activated"
        );
        Ok(machine)
    }

    /// Updates machine attributes, optionally moving it to another license.
    ///
    /// A move is checked like an activation against the new license and
    /// shifts one unit of `machines_count` between the two atomically.
    pub fn update(
        &self,
        id: MachineId,
        attrs: MachineAttributes,
        new_license_key: Option<&str>,
    ) -> LicenseResult<Machine> {
        let mut machine = self.get_machine(id)?;

        if let Some(key) = new_license_key {
            let target = self.license_by_key(key)?;
            if target.id != machine.license_id {
                Self::ensure_usable(&target)?;
                let policy = self.policy_for(&target)?;
                if self.store.find_machine(target.id, &machine.fingerprint)?.is_some() {
                    return Err(LicenseError::FingerprintAlreadyAssociated);
                }

                let from = machine.license_id;
                machine.license_id = target.id;
                machine.updated_at = Utc::now();
                let limit = evaluator::machine_limit(&policy, &target);
                self.store
                    .move_machine(&machine, from, limit)
                    .map_err(|e| Self::map_slot_error(e, &target))?;
                info!(machine_id = %id, from = %from, to = %target.id, "Machine moved");
            }
        }

        self.store
            .update_machine_attributes(id, &attrs)
            .map_err(|e| missing_machine(id, e))
    }

    /// Deletes the machine, returning its license with the updated count.
    pub fn deactivate(&self, id: MachineId) -> LicenseResult<License> {
        let license = self
            .store
            .delete_machine(id)
            .map_err(|e| missing_machine(id, e))?;
        info!(
            machine_id = %id,
            license_id = %license.id,
            machines_count = license.machines_count,
            "Machine deactivated"
        );
        Ok(license)
    }

    // ── Checkout ─────────────────────────────────────────────────

    /// Issues a signed machine certificate under the owning license's policy.
    pub fn checkout(&self, id: MachineId, options: CheckoutOptions) -> LicenseResult<Checkout> {
        let mut machine = self.get_machine(id)?;
        let license = self.license(machine.license_id)?;
        if license.is_banned() {
            return Err(LicenseError::LicenseBanned);
        }
        let policy = self.policy_for(&license)?;

        let now = Utc::now();
        let ttl = evaluator::clamp_ttl(&self.config.checkout, options.ttl);
        let meta = CertificateMeta {
            issued: now,
            expiry: evaluator::add(now, ttl)?,
            ttl,
        };
        machine.last_checkout_at = Some(now);
        machine.updated_at = now;

        let snapshot = MachineSnapshot::new(&machine, meta.clone());
        let token = policy.scheme.sign_json(policy.keys.private_key(), &snapshot)?;
        let encrypt = policy.encrypted || options.encrypt;
        let encoded =
            tollgate_crypto::encode(CertificateKind::Machine, policy.scheme, &token, encrypt)?;

        self.store
            .record_machine_checkout(id, now)
            .map_err(|e| missing_machine(id, e))?;
        debug!(machine_id = %id, ttl, encrypted = encrypt, "Machine checked out");
        Ok(Checkout::new(encoded, &meta))
    }

    // ── Heartbeat ────────────────────────────────────────────────

    pub fn ping(&self, id: MachineId) -> LicenseResult<Machine> {
        let machine = self
            .store
            .set_heartbeat(id, Some(Utc::now()))
            .map_err(|e| missing_machine(id, e))?;
        debug!(machine_id = %id, "Heartbeat ping");
        Ok(machine)
    }

    /// Clears the heartbeat without deactivating the machine.
    pub fn reset_heartbeat(&self, id: MachineId) -> LicenseResult<Machine> {
        let machine = self
            .store
            .set_heartbeat(id, None)
            .map_err(|e| missing_machine(id, e))?;
        debug!(machine_id = %id, "Heartbeat reset");
        Ok(machine)
    }

    pub fn heartbeat_status(&self, id: MachineId) -> LicenseResult<HeartbeatStatus> {
        let machine = self.get_machine(id)?;
        let license = self.license(machine.license_id)?;
        let policy = self.policy_for(&license)?;
        Ok(evaluator::heartbeat_status(&policy, &machine, Utc::now()))
    }
}

fn missing_machine(id: MachineId, err: StoreError) -> LicenseError {
    match err {
        StoreError::NotFound { kind: "machine", .. } => LicenseError::MachineNotFound(id),
        other => other.into(),
    }
}
