//! License lifecycle: create, validate, suspend/reinstate, renew, usage
//! metering, check-in and checkout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tollgate_crypto::{CertificateKind, KeyPair, Scheme, Verification};
use tollgate_store::{LicenseTransition, Store, StoreError};
use tollgate_types::{
    ExpirationStrategy, License, LicenseId, LicenseKey, LicenseStatus, LimitOverrides, Metadata,
    Policy, PolicyId, ProductId, TenantId,
};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::evaluator::{self, ScopeMatch, ValidationResult};
use crate::snapshot::{CertificateMeta, Checkout, CheckoutOptions, LicenseSnapshot};

/// Attempts a guarded write gets before giving up on a contended license.
const MAX_ATTEMPTS: usize = 8;

/// Parameters for [`LicenseEngine::create`].
#[derive(Debug, Clone)]
pub struct CreateLicense {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub policy_id: PolicyId,
    pub name: Option<String>,
    pub overrides: LimitOverrides,
    pub expiry: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

impl CreateLicense {
    /// Parameters for a plain license under `policy`.
    #[must_use]
    pub fn for_policy(policy: &Policy) -> Self {
        Self {
            tenant_id: policy.tenant_id,
            product_id: policy.product_id,
            policy_id: policy.id,
            name: None,
            overrides: LimitOverrides::default(),
            expiry: None,
            metadata: Metadata::new(),
        }
    }
}

/// Optional constraints for validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationScope {
    /// Require that a machine with this fingerprint is activated.
    pub fingerprint: Option<String>,
}

/// Orchestrates license operations over a [`Store`].
pub struct LicenseEngine<S> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: Store> LicenseEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Lookup ───────────────────────────────────────────────────

    pub fn get_license(&self, id: LicenseId) -> LicenseResult<License> {
        self.store
            .get_license(id)?
            .ok_or_else(|| LicenseError::InvalidLicense(id.to_string()))
    }

    pub fn find_by_key(&self, key: &str) -> LicenseResult<License> {
        self.store
            .find_license_by_key(key)?
            .ok_or_else(|| LicenseError::InvalidLicense(key.to_string()))
    }

    fn policy_for(&self, license: &License) -> LicenseResult<Policy> {
        self.store
            .get_policy(license.policy_id)?
            .ok_or(LicenseError::InvalidPolicy(license.policy_id))
    }

    fn load(&self, id: LicenseId) -> LicenseResult<(License, Policy)> {
        let license = self.get_license(id)?;
        let policy = self.policy_for(&license)?;
        Ok((license, policy))
    }

    // ── Create ───────────────────────────────────────────────────

    /// Creates a license in `NOT_ACTIVATED` state with a fresh key.
    pub fn create(&self, params: CreateLicense) -> LicenseResult<License> {
        let tenant = self
            .store
            .get_tenant(params.tenant_id)?
            .ok_or(LicenseError::InvalidTenant(params.tenant_id))?;
        let product = self
            .store
            .get_product(params.product_id)?
            .filter(|p| p.tenant_id == tenant.id)
            .ok_or(LicenseError::InvalidProduct(params.product_id))?;
        let policy = self
            .store
            .get_policy(params.policy_id)?
            .filter(|p| p.product_id == product.id)
            .ok_or(LicenseError::InvalidPolicy(params.policy_id))?;

        let now = Utc::now();
        let expiry = evaluator::initial_expiry(&policy, params.expiry, now)?;
        let overrides = params.overrides;
        let license = License {
            id: LicenseId::new(),
            tenant_id: tenant.id,
            product_id: product.id,
            policy_id: policy.id,
            name: params.name,
            key: LicenseKey::generate(),
            status: LicenseStatus::NotActivated,
            uses: 0,
            machines_count: 0,
            max_machines: overrides.max_machines.unwrap_or(policy.max_machines),
            max_uses: overrides.max_uses.unwrap_or(policy.max_uses),
            max_users: overrides.max_users.unwrap_or(policy.max_users),
            expiry,
            last_check_in_at: None,
            last_checkout_at: None,
            metadata: params.metadata,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_license(&license)?;
        info!(
            license_id = %license.id,
            policy_id = %policy.id,
            expiry = ?license.expiry,
            "License created"
        );
        Ok(license)
    }

    // ── Validate ─────────────────────────────────────────────────

    /// Validates a license. Never mutates state.
    pub fn validate(
        &self,
        id: LicenseId,
        scope: &ValidationScope,
    ) -> LicenseResult<ValidationResult> {
        let (license, policy) = self.load(id)?;
        self.evaluate(&license, &policy, scope)
    }

    /// Validates the license with the given key.
    pub fn validate_key(
        &self,
        key: &str,
        scope: &ValidationScope,
    ) -> LicenseResult<ValidationResult> {
        let license = self.find_by_key(key)?;
        let policy = self.policy_for(&license)?;
        self.evaluate(&license, &policy, scope)
    }

    fn evaluate(
        &self,
        license: &License,
        policy: &Policy,
        scope: &ValidationScope,
    ) -> LicenseResult<ValidationResult> {
        let scope = match &scope.fingerprint {
            None => ScopeMatch::Unscoped,
            Some(fingerprint) => match self.store.find_machine(license.id, fingerprint)? {
                Some(_) => ScopeMatch::Matched,
                None => ScopeMatch::Unmatched,
            },
        };
        let result = evaluator::validate(policy, license, scope, Utc::now());
        debug!(
            license_id = %license.id,
            valid = result.valid,
            code = ?result.code,
            "License validated"
        );
        Ok(result)
    }

    // ── State transitions ────────────────────────────────────────

    pub fn suspend(&self, id: LicenseId) -> LicenseResult<License> {
        let license = retry(id, || {
            let license = self.get_license(id)?;
            match license.status {
                LicenseStatus::NotActivated => return Err(LicenseError::NotActivated),
                LicenseStatus::Banned => {
                    return Err(LicenseError::InvalidTransition {
                        from: LicenseStatus::Banned,
                        to: LicenseStatus::Suspended,
                    });
                }
                _ => {}
            }
            let change = LicenseTransition::from_current(&license, Utc::now())
                .status(LicenseStatus::Suspended);
            self.transition(id, &change)
        })?;
        info!(license_id = %id, "License suspended");
        Ok(license)
    }

    pub fn reinstate(&self, id: LicenseId) -> LicenseResult<License> {
        let license = retry(id, || {
            let license = self.get_license(id)?;
            if license.status != LicenseStatus::Suspended {
                return Err(LicenseError::InvalidTransition {
                    from: license.status,
                    to: LicenseStatus::Active,
                });
            }
            let change = LicenseTransition::from_current(&license, Utc::now())
                .status(LicenseStatus::Active);
            self.transition(id, &change)
        })?;
        info!(license_id = %id, "License reinstated");
        Ok(license)
    }

    /// Extends the expiry per the policy's renewal basis.
    ///
    /// Licenses without an expiry are returned unchanged. A suspended license
    /// gets the new expiry but stays suspended. Under a zero-duration policy
    /// the expiry is cleared and the status is left alone.
    pub fn renew(&self, id: LicenseId) -> LicenseResult<License> {
        retry(id, || {
            let (license, policy) = self.load(id)?;
            if license.status == LicenseStatus::Banned {
                return Err(LicenseError::InvalidTransition {
                    from: LicenseStatus::Banned,
                    to: LicenseStatus::Active,
                });
            }
            if license.expiry.is_none() {
                return Ok(Some(license));
            }

            let now = Utc::now();
            let expiry = evaluator::renewed_expiry(&policy, license.expiry, now)?;
            let status = match expiry {
                Some(at) if license.status != LicenseStatus::Suspended => {
                    if at < now {
                        LicenseStatus::Expired
                    } else {
                        LicenseStatus::Active
                    }
                }
                _ => license.status,
            };
            let change = LicenseTransition::from_current(&license, now)
                .status(status)
                .expiry(expiry);
            let renewed = self.transition(id, &change)?;
            if let Some(renewed) = &renewed {
                info!(
                    license_id = %id,
                    previous = ?license.expiry,
                    expiry = ?renewed.expiry,
                    basis = %policy.renewal_basis,
                    "License renewed"
                );
            }
            Ok(renewed)
        })
    }

    fn transition(
        &self,
        id: LicenseId,
        change: &LicenseTransition,
    ) -> LicenseResult<Option<License>> {
        self.store
            .transition_license(id, change)
            .map_err(|e| missing_license(id, e))
    }

    // ── Usage ────────────────────────────────────────────────────

    pub fn increment_usage(&self, id: LicenseId, n: u32) -> LicenseResult<License> {
        let (license, policy) = self.load(id)?;
        let limit = evaluator::usage_limit(&policy, &license);
        match self.store.increment_uses(id, n, limit) {
            Ok(updated) => {
                if updated.max_uses != 0 && updated.uses > updated.max_uses {
                    warn!(
                        license_id = %id,
                        uses = updated.uses,
                        max = updated.max_uses,
                        "Usage overage allowed"
                    );
                }
                debug!(license_id = %id, uses = updated.uses, "Usage incremented");
                Ok(updated)
            }
            Err(StoreError::LimitExceeded { limit, .. }) => {
                warn!(license_id = %id, requested = n, max = limit, "Usage limit exceeded");
                Err(LicenseError::MaxUsesExceeded { max: limit })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn decrement_usage(&self, id: LicenseId, n: u32) -> LicenseResult<License> {
        match self.store.decrement_uses(id, n) {
            Ok(updated) => {
                debug!(license_id = %id, uses = updated.uses, "Usage decremented");
                Ok(updated)
            }
            Err(StoreError::Underflow { current, requested, .. }) => {
                Err(LicenseError::InvalidDecrement {
                    uses: current,
                    n: requested,
                })
            }
            Err(e) => Err(missing_license(id, e)),
        }
    }

    pub fn reset_usage(&self, id: LicenseId) -> LicenseResult<License> {
        match self.store.reset_uses(id) {
            Ok(updated) => {
                info!(license_id = %id, "Usage reset");
                Ok(updated)
            }
            Err(e) => Err(missing_license(id, e)),
        }
    }

    // ── Check-in / checkout ──────────────────────────────────────

    pub fn check_in(&self, id: LicenseId) -> LicenseResult<License> {
        let license = self
            .store
            .record_check_in(id, Utc::now())
            .map_err(|e| missing_license(id, e))?;
        debug!(license_id = %id, "License checked in");
        Ok(license)
    }

    /// Issues a signed license certificate.
    ///
    /// The first checkout of a `NOT_ACTIVATED` license activates it. Nothing
    /// is persisted unless signing and encoding succeed, and the certificate
    /// is reissued if the status changes before it is recorded.
    pub fn checkout(&self, id: LicenseId, options: CheckoutOptions) -> LicenseResult<Checkout> {
        retry(id, || {
            let (license, policy) = self.load(id)?;
            let now = Utc::now();

            match evaluator::effective_status(&license, now) {
                LicenseStatus::Banned => return Err(LicenseError::LicenseBanned),
                LicenseStatus::Expired
                    if policy.expiration_strategy == ExpirationStrategy::Revoke =>
                {
                    return Err(LicenseError::LicenseExpired);
                }
                _ => {}
            }

            let ttl = evaluator::clamp_ttl(&self.config.checkout, options.ttl);
            let meta = CertificateMeta {
                issued: now,
                expiry: evaluator::add(now, ttl)?,
                ttl,
            };

            let observed = license.status;
            let mut issued = license;
            if observed == LicenseStatus::NotActivated {
                issued.status = LicenseStatus::Active;
            }
            issued.last_checkout_at = Some(now);
            issued.updated_at = now;

            let snapshot = LicenseSnapshot::new(&issued, meta.clone());
            let token = policy.scheme.sign_json(policy.keys.private_key(), &snapshot)?;
            let encrypt = options.encrypt || policy.encrypted;
            let encoded =
                tollgate_crypto::encode(CertificateKind::License, policy.scheme, &token, encrypt)?;

            let recorded = self
                .store
                .record_license_checkout(id, observed, now)
                .map_err(|e| missing_license(id, e))?;
            if recorded.is_none() {
                return Ok(None);
            }
            if observed == LicenseStatus::NotActivated {
                info!(license_id = %id, "License activated by first checkout");
            }
            debug!(license_id = %id, ttl, encrypted = encrypt, "License checked out");
            Ok(Some(Checkout::new(encoded, &meta)))
        })
    }

    // ── Crypto pass-throughs ─────────────────────────────────────

    pub fn generate_key_pair(scheme: Scheme) -> LicenseResult<KeyPair> {
        Ok(scheme.generate_key_pair()?)
    }

    pub fn sign(scheme: Scheme, private_key: &str, payload: &[u8]) -> LicenseResult<String> {
        Ok(scheme.sign(private_key, payload)?)
    }

    pub fn verify(scheme: Scheme, public_key: &str, token: &str) -> LicenseResult<Verification> {
        Ok(scheme.verify(public_key, token)?)
    }
}

/// Re-runs `attempt` on fresh reads until its guarded write lands.
fn retry<T>(
    id: LicenseId,
    mut attempt: impl FnMut() -> LicenseResult<Option<T>>,
) -> LicenseResult<T> {
    for _ in 0..MAX_ATTEMPTS {
        if let Some(done) = attempt()? {
            return Ok(done);
        }
        debug!(license_id = %id, "License changed concurrently, retrying");
    }
    warn!(license_id = %id, attempts = MAX_ATTEMPTS, "License write kept losing races");
    Err(LicenseError::Contended(id))
}

fn missing_license(id: LicenseId, err: StoreError) -> LicenseError {
    match err {
        StoreError::NotFound { kind: "license", .. } => {
            LicenseError::InvalidLicense(id.to_string())
        }
        other => other.into(),
    }
}
