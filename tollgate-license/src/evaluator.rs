//! Pure policy evaluation.
//!
//! Nothing here reads the clock or touches storage: every function takes
//! `now` and the records it needs, so decisions can be tested at any instant.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tollgate_types::{
    CheckInInterval, HeartbeatBasis, License, LicenseStatus, Machine, Policy, RenewalBasis,
};

use crate::config::CheckoutConfig;
use crate::error::{LicenseError, LicenseResult};

/// Outcome code of [`validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    Valid,
    Banned,
    Expired,
    Suspended,
    NoMachine,
    Overdue,
    TooManyMachines,
    FingerprintScopeMismatch,
}

/// Result of validating a license. Validation never fails; an unusable
/// license is `valid: false` with a code saying why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub code: ValidationCode,
    pub detail: String,
}

impl ValidationResult {
    fn new(valid: bool, code: ValidationCode, detail: impl Into<String>) -> Self {
        Self {
            valid,
            code,
            detail: detail.into(),
        }
    }
}

/// Whether a requested fingerprint scope matched one of the license's machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMatch {
    /// No fingerprint was supplied.
    Unscoped,
    Matched,
    Unmatched,
}

/// Liveness of a machine's heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeartbeatStatus {
    NotStarted,
    Alive,
    Dead,
}

/// Converts a second count into a `TimeDelta`, rejecting values chrono
/// cannot represent.
pub(crate) fn seconds(secs: u64) -> LicenseResult<TimeDelta> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| LicenseError::InvalidExpiry(format!("{secs} seconds is out of range")))
}

pub(crate) fn add(at: DateTime<Utc>, secs: u64) -> LicenseResult<DateTime<Utc>> {
    at.checked_add_signed(seconds(secs)?)
        .ok_or_else(|| LicenseError::InvalidExpiry(format!("{at} + {secs}s overflows")))
}

/// Status after applying the expiry. Only the "live" states decay into
/// `EXPIRED`; suspended and banned licenses keep their stored status.
#[must_use]
pub fn effective_status(license: &License, now: DateTime<Utc>) -> LicenseStatus {
    match license.status {
        LicenseStatus::NotActivated | LicenseStatus::Active | LicenseStatus::Inactive
            if license.is_expired_at(now) =>
        {
            LicenseStatus::Expired
        }
        status => status,
    }
}

/// Expiry for a newly created license.
///
/// With a policy duration the expiry is `(explicit or now) + duration`;
/// without one the explicit expiry is kept as given.
pub fn initial_expiry(
    policy: &Policy,
    explicit: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> LicenseResult<Option<DateTime<Utc>>> {
    if policy.duration == 0 {
        return Ok(explicit);
    }
    add(explicit.unwrap_or(now), policy.duration).map(Some)
}

/// Expiry after a renewal. A license without an expiry stays without one,
/// and a policy without a duration clears it.
pub fn renewed_expiry(
    policy: &Policy,
    expiry: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> LicenseResult<Option<DateTime<Utc>>> {
    let Some(expiry) = expiry else {
        return Ok(None);
    };
    if policy.duration == 0 {
        return Ok(None);
    }

    let base = match policy.renewal_basis {
        RenewalBasis::FromExpiry => expiry,
        RenewalBasis::FromNow => now,
        RenewalBasis::FromNowIfExpired if now > expiry => now,
        RenewalBasis::FromNowIfExpired => expiry,
    };
    add(base, policy.duration).map(Some)
}

/// Maximum time between check-ins.
///
/// Weekly shares the daily threshold; existing deployments depend on it.
#[must_use]
pub fn check_in_threshold(interval: CheckInInterval) -> TimeDelta {
    match interval {
        CheckInInterval::Daily | CheckInInterval::Weekly => TimeDelta::hours(24),
        CheckInInterval::Monthly => TimeDelta::days(30),
        CheckInInterval::Yearly => TimeDelta::days(365),
    }
}

/// True when the policy requires check-ins and the last one (or creation)
/// is further back than the interval allows.
#[must_use]
pub fn is_check_in_overdue(policy: &Policy, license: &License, now: DateTime<Utc>) -> bool {
    if !policy.require_check_in {
        return false;
    }
    let Some(interval) = policy.check_in_interval else {
        return false;
    };
    let since = license.last_check_in_at.unwrap_or(license.created_at);
    now - since > check_in_threshold(interval)
}

/// Guard limit for incrementing `uses`, or `None` when any amount is admitted.
#[must_use]
pub fn usage_limit(policy: &Policy, license: &License) -> Option<u32> {
    (license.max_uses != 0 && !policy.allows_overage()).then_some(license.max_uses)
}

/// Guard limit for activating a machine, or `None` when any number is
/// admitted. A `max_machines` of 0 means unlimited.
#[must_use]
pub fn machine_limit(policy: &Policy, license: &License) -> Option<u32> {
    (license.max_machines != 0 && !policy.allows_overage()).then_some(license.max_machines)
}

/// Evaluates the validation decision table.
pub fn validate(
    policy: &Policy,
    license: &License,
    scope: ScopeMatch,
    now: DateTime<Utc>,
) -> ValidationResult {
    match effective_status(license, now) {
        LicenseStatus::Banned => {
            return ValidationResult::new(false, ValidationCode::Banned, "is banned");
        }
        LicenseStatus::Expired => {
            return ValidationResult::new(false, ValidationCode::Expired, "is expired");
        }
        LicenseStatus::Suspended => {
            return ValidationResult::new(false, ValidationCode::Suspended, "is suspended");
        }
        LicenseStatus::NotActivated | LicenseStatus::Active | LicenseStatus::Inactive => {}
    }

    if scope == ScopeMatch::Unmatched {
        return ValidationResult::new(
            false,
            ValidationCode::FingerprintScopeMismatch,
            "fingerprint is not activated",
        );
    }

    let mut result = ValidationResult::new(true, ValidationCode::Valid, "is valid");
    if license.status == LicenseStatus::NotActivated
        && !policy.is_floating()
        && license.machines_count == 0
    {
        result = ValidationResult::new(true, ValidationCode::NoMachine, "has no machine");
    }

    if is_check_in_overdue(policy, license, now) {
        return ValidationResult::new(false, ValidationCode::Overdue, "is overdue for check in");
    }

    if license.max_machines != 0 && license.machines_count > license.max_machines {
        result = ValidationResult::new(
            policy.allows_overage(),
            ValidationCode::TooManyMachines,
            "has too many associated machines",
        );
    }

    result
}

/// Heartbeat liveness of `machine` under `policy`.
#[must_use]
pub fn heartbeat_status(policy: &Policy, machine: &Machine, now: DateTime<Utc>) -> HeartbeatStatus {
    let since = match (machine.last_heartbeat_at, policy.heartbeat_basis) {
        (Some(at), _) => at,
        (None, HeartbeatBasis::FromCreation) => machine.created_at,
        (None, HeartbeatBasis::FromFirstPing) => return HeartbeatStatus::NotStarted,
    };
    let allowed = seconds(policy.heartbeat_duration).unwrap_or(TimeDelta::MAX);
    if now - since > allowed {
        HeartbeatStatus::Dead
    } else {
        HeartbeatStatus::Alive
    }
}

/// Clamps a requested certificate TTL into the configured bounds.
#[must_use]
pub fn clamp_ttl(config: &CheckoutConfig, requested: Option<u64>) -> u64 {
    requested
        .unwrap_or(config.default_ttl)
        .max(config.minimum_ttl)
        .min(config.maximum_ttl)
}
