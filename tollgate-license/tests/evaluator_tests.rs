mod common;

use chrono::{TimeDelta, TimeZone, Utc};
use common::detached_license;
use tollgate_crypto::Scheme;
use tollgate_license::evaluator::{
    effective_status, heartbeat_status, initial_expiry, is_check_in_overdue, machine_limit,
    renewed_expiry, usage_limit, validate,
};
use tollgate_license::{HeartbeatStatus, ScopeMatch, ValidationCode};
use tollgate_types::{
    CheckInInterval, HeartbeatBasis, LicenseStatus, Machine, MachineAttributes, OverageStrategy,
    Policy, ProductId, RenewalBasis, TenantId,
};

fn policy() -> Policy {
    Policy::new(TenantId::new(), ProductId::new(), "eval", Scheme::Ed25519Sign).unwrap()
}

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

// ── Expiry ─────────────────────────────────────────────────────────

#[test]
fn initial_expiry_from_now() {
    let mut p = policy();
    p.duration = 86_400;
    assert_eq!(
        initial_expiry(&p, None, t0()).unwrap(),
        Some(t0() + TimeDelta::days(1))
    );
}

#[test]
fn initial_expiry_from_explicit() {
    let mut p = policy();
    p.duration = 3_600;
    let explicit = t0() + TimeDelta::days(10);
    assert_eq!(
        initial_expiry(&p, Some(explicit), t0()).unwrap(),
        Some(explicit + TimeDelta::hours(1))
    );
}

#[test]
fn initial_expiry_without_duration() {
    let p = policy();
    assert_eq!(initial_expiry(&p, None, t0()).unwrap(), None);
    let explicit = t0() + TimeDelta::days(3);
    assert_eq!(initial_expiry(&p, Some(explicit), t0()).unwrap(), Some(explicit));
}

#[test]
fn initial_expiry_overflow_is_error() {
    let mut p = policy();
    p.duration = u64::MAX;
    assert!(initial_expiry(&p, None, t0()).is_err());
}

#[test]
fn renew_from_expiry() {
    let mut p = policy();
    p.duration = 86_400;
    p.renewal_basis = RenewalBasis::FromExpiry;
    let expiry = t0() - TimeDelta::days(5);
    assert_eq!(
        renewed_expiry(&p, Some(expiry), t0()).unwrap(),
        Some(expiry + TimeDelta::days(1))
    );
}

#[test]
fn renew_from_now() {
    let mut p = policy();
    p.duration = 86_400;
    p.renewal_basis = RenewalBasis::FromNow;
    let expiry = t0() + TimeDelta::days(5);
    assert_eq!(
        renewed_expiry(&p, Some(expiry), t0()).unwrap(),
        Some(t0() + TimeDelta::days(1))
    );
}

#[test]
fn renew_from_now_if_expired() {
    let mut p = policy();
    p.duration = 86_400;
    p.renewal_basis = RenewalBasis::FromNowIfExpired;

    let lapsed = t0() - TimeDelta::hours(1);
    assert_eq!(
        renewed_expiry(&p, Some(lapsed), t0()).unwrap(),
        Some(t0() + TimeDelta::days(1))
    );

    let current = t0() + TimeDelta::hours(1);
    assert_eq!(
        renewed_expiry(&p, Some(current), t0()).unwrap(),
        Some(current + TimeDelta::days(1))
    );
}

#[test]
fn renew_without_expiry_or_duration() {
    let mut p = policy();
    assert_eq!(renewed_expiry(&p, None, t0()).unwrap(), None);
    assert_eq!(renewed_expiry(&p, Some(t0()), t0()).unwrap(), None);
    p.duration = 60;
    assert_eq!(renewed_expiry(&p, None, t0()).unwrap(), None);
}

#[test]
fn effective_status_derives_expired() {
    let p = policy();
    let mut license = detached_license(&p, t0());
    license.expiry = Some(t0() + TimeDelta::hours(1));
    assert_eq!(effective_status(&license, t0()), LicenseStatus::NotActivated);
    assert_eq!(
        effective_status(&license, t0() + TimeDelta::hours(2)),
        LicenseStatus::Expired
    );

    license.status = LicenseStatus::Suspended;
    assert_eq!(
        effective_status(&license, t0() + TimeDelta::hours(2)),
        LicenseStatus::Suspended
    );
}

// ── Check-in ───────────────────────────────────────────────────────

#[test]
fn check_in_thresholds() {
    let mut p = policy();
    p.require_check_in = true;
    let license = detached_license(&p, t0());

    for (interval, ok, late) in [
        (CheckInInterval::Daily, TimeDelta::hours(23), TimeDelta::hours(25)),
        (CheckInInterval::Weekly, TimeDelta::hours(23), TimeDelta::hours(25)),
        (CheckInInterval::Monthly, TimeDelta::days(29), TimeDelta::days(31)),
        (CheckInInterval::Yearly, TimeDelta::days(364), TimeDelta::days(366)),
    ] {
        p.check_in_interval = Some(interval);
        assert!(!is_check_in_overdue(&p, &license, t0() + ok), "{interval}");
        assert!(is_check_in_overdue(&p, &license, t0() + late), "{interval}");
    }
}

#[test]
fn check_in_measured_from_last_check_in() {
    let mut p = policy();
    p.require_check_in = true;
    p.check_in_interval = Some(CheckInInterval::Daily);
    let mut license = detached_license(&p, t0());
    license.last_check_in_at = Some(t0() + TimeDelta::days(10));
    assert!(!is_check_in_overdue(&p, &license, t0() + TimeDelta::days(10) + TimeDelta::hours(5)));
}

#[test]
fn check_in_not_required() {
    let mut p = policy();
    p.check_in_interval = Some(CheckInInterval::Daily);
    let license = detached_license(&p, t0());
    assert!(!is_check_in_overdue(&p, &license, t0() + TimeDelta::days(400)));
}

// ── Limits ─────────────────────────────────────────────────────────

#[test]
fn guard_limits() {
    let mut p = policy();
    let mut license = detached_license(&p, t0());
    assert_eq!(usage_limit(&p, &license), None);
    assert_eq!(machine_limit(&p, &license), None);

    license.max_uses = 5;
    license.max_machines = 2;
    assert_eq!(usage_limit(&p, &license), Some(5));
    assert_eq!(machine_limit(&p, &license), Some(2));

    p.overage_strategy = OverageStrategy::AlwaysAllow;
    assert_eq!(usage_limit(&p, &license), None);
    assert_eq!(machine_limit(&p, &license), None);
}

// ── Validation table ───────────────────────────────────────────────

#[test]
fn banned_wins_over_everything() {
    let mut p = policy();
    p.require_check_in = true;
    p.check_in_interval = Some(CheckInInterval::Daily);
    let mut license = detached_license(&p, t0());
    license.status = LicenseStatus::Banned;
    license.expiry = Some(t0());
    license.machines_count = 10;
    license.max_machines = 1;

    let result = validate(&p, &license, ScopeMatch::Unmatched, t0() + TimeDelta::days(30));
    assert!(!result.valid);
    assert_eq!(result.code, ValidationCode::Banned);
}

#[test]
fn expired_then_suspended() {
    let p = policy();
    let mut license = detached_license(&p, t0());
    license.status = LicenseStatus::Active;
    license.expiry = Some(t0());
    let result = validate(&p, &license, ScopeMatch::Unscoped, t0() + TimeDelta::seconds(1));
    assert_eq!((result.valid, result.code), (false, ValidationCode::Expired));

    license.status = LicenseStatus::Suspended;
    let result = validate(&p, &license, ScopeMatch::Unscoped, t0() + TimeDelta::seconds(1));
    assert_eq!((result.valid, result.code), (false, ValidationCode::Suspended));
}

#[test]
fn no_machine_is_advisory() {
    let mut p = policy();
    p.max_machines = 1;
    let license = detached_license(&p, t0());
    let result = validate(&p, &license, ScopeMatch::Unscoped, t0());
    assert!(result.valid);
    assert_eq!(result.code, ValidationCode::NoMachine);
}

#[test]
fn plain_valid() {
    let p = policy();
    let mut license = detached_license(&p, t0());
    license.status = LicenseStatus::Active;
    let result = validate(&p, &license, ScopeMatch::Matched, t0());
    assert!(result.valid);
    assert_eq!(result.code, ValidationCode::Valid);
}

#[test]
fn overdue_overrides_no_machine() {
    let mut p = policy();
    p.max_machines = 1;
    p.require_check_in = true;
    p.check_in_interval = Some(CheckInInterval::Daily);
    let license = detached_license(&p, t0());
    let result = validate(&p, &license, ScopeMatch::Unscoped, t0() + TimeDelta::days(2));
    assert!(!result.valid);
    assert_eq!(result.code, ValidationCode::Overdue);
}

#[test]
fn too_many_machines_depends_on_overage() {
    let mut p = policy();
    let mut license = detached_license(&p, t0());
    license.status = LicenseStatus::Active;
    license.max_machines = 2;
    license.machines_count = 3;

    let result = validate(&p, &license, ScopeMatch::Unscoped, t0());
    assert_eq!((result.valid, result.code), (false, ValidationCode::TooManyMachines));

    p.overage_strategy = OverageStrategy::AlwaysAllow;
    let result = validate(&p, &license, ScopeMatch::Unscoped, t0());
    assert_eq!((result.valid, result.code), (true, ValidationCode::TooManyMachines));
}

#[test]
fn fingerprint_scope_mismatch() {
    let p = policy();
    let mut license = detached_license(&p, t0());
    license.status = LicenseStatus::Active;
    let result = validate(&p, &license, ScopeMatch::Unmatched, t0());
    assert!(!result.valid);
    assert_eq!(result.code, ValidationCode::FingerprintScopeMismatch);
}

#[test]
fn validation_code_wire_names() {
    assert_eq!(
        serde_json::to_string(&ValidationCode::TooManyMachines).unwrap(),
        "\"TOO_MANY_MACHINES\""
    );
    assert_eq!(
        serde_json::to_string(&ValidationCode::NoMachine).unwrap(),
        "\"NO_MACHINE\""
    );
}

// ── Heartbeat ──────────────────────────────────────────────────────

fn machine_at(created: chrono::DateTime<Utc>) -> Machine {
    let mut machine = Machine::new(
        tollgate_types::LicenseId::new(),
        "fp",
        MachineAttributes::default(),
    );
    machine.created_at = created;
    machine
}

#[test]
fn heartbeat_from_first_ping() {
    let mut p = policy();
    p.heartbeat_basis = HeartbeatBasis::FromFirstPing;
    let mut machine = machine_at(t0());
    assert_eq!(
        heartbeat_status(&p, &machine, t0() + TimeDelta::days(1)),
        HeartbeatStatus::NotStarted
    );

    machine.last_heartbeat_at = Some(t0());
    assert_eq!(
        heartbeat_status(&p, &machine, t0() + TimeDelta::minutes(5)),
        HeartbeatStatus::Alive
    );
    assert_eq!(
        heartbeat_status(&p, &machine, t0() + TimeDelta::minutes(11)),
        HeartbeatStatus::Dead
    );
}

#[test]
fn heartbeat_from_creation() {
    let mut p = policy();
    p.heartbeat_basis = HeartbeatBasis::FromCreation;
    p.heartbeat_duration = 60;
    let machine = machine_at(t0());
    assert_eq!(
        heartbeat_status(&p, &machine, t0() + TimeDelta::seconds(30)),
        HeartbeatStatus::Alive
    );
    assert_eq!(
        heartbeat_status(&p, &machine, t0() + TimeDelta::seconds(61)),
        HeartbeatStatus::Dead
    );
}
