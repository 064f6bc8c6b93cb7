//! End-to-end flows through the engine and machine manager.

mod common;

use chrono::{TimeDelta, Utc};
use common::{assert_close, harness_with};
use pretty_assertions::assert_eq;
use tollgate_license::{CheckoutOptions, ErrorKind, LicenseError, ValidationCode, ValidationScope};
use tollgate_types::{LicenseStatus, MachineAttributes, OverageStrategy};

#[test]
fn node_locked_license_flow() {
    let h = harness_with(|p| {
        p.duration = 86_400;
        p.max_machines = 1;
        p.overage_strategy = OverageStrategy::NoOverage;
    });

    let license = h.license();
    assert_eq!(license.status, LicenseStatus::NotActivated);
    assert_close(license.expiry.unwrap(), Utc::now() + TimeDelta::seconds(86_400));

    let result = h
        .engine
        .validate(license.id, &ValidationScope::default())
        .unwrap();
    assert_eq!((result.valid, result.code), (true, ValidationCode::NoMachine));

    h.machines
        .activate(license.key.as_str(), "machine-a", MachineAttributes::default())
        .unwrap();
    let after_a = h.engine.get_license(license.id).unwrap();
    assert_eq!(after_a.machines_count, 1);
    assert_eq!(after_a.status, LicenseStatus::NotActivated);

    let err = h
        .machines
        .activate(license.key.as_str(), "machine-b", MachineAttributes::default())
        .unwrap_err();
    assert!(matches!(err, LicenseError::MaxMachineExceeded { max: 1 }));

    h.engine
        .checkout(license.id, CheckoutOptions::default())
        .unwrap();
    assert_eq!(
        h.engine.get_license(license.id).unwrap().status,
        LicenseStatus::Active
    );
}

#[test]
fn usage_limit_leaves_uses_untouched() {
    let h = harness_with(|p| {
        p.max_uses = 5;
        p.overage_strategy = OverageStrategy::NoOverage;
    });
    let license = h.license();
    h.engine.increment_usage(license.id, 4).unwrap();

    let err = h.engine.increment_usage(license.id, 2).unwrap_err();
    assert!(matches!(err, LicenseError::MaxUsesExceeded { max: 5 }));
    assert_eq!(err.code(), "LICENSE_USAGE_EXCEEDED");
    assert_eq!(h.engine.get_license(license.id).unwrap().uses, 4);
}

#[test]
fn suspend_reinstate_twice() {
    let h = harness_with(|_| {});
    let license = h.license();
    h.engine
        .checkout(license.id, CheckoutOptions::default())
        .unwrap();

    h.engine.suspend(license.id).unwrap();
    let reinstated = h.engine.reinstate(license.id).unwrap();
    assert_eq!(reinstated.status, LicenseStatus::Active);

    let err = h.engine.reinstate(license.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn banned_license_is_dead_everywhere() {
    let h = harness_with(|p| p.max_machines = 2);
    let license = h.license();
    let machine = h
        .machines
        .activate(license.key.as_str(), "fp", MachineAttributes::default())
        .unwrap();
    h.rewrite(license.id, |l| l.status = LicenseStatus::Banned);

    let scope = ValidationScope {
        fingerprint: Some("fp".into()),
    };
    let result = h.engine.validate(license.id, &scope).unwrap();
    assert_eq!((result.valid, result.code), (false, ValidationCode::Banned));
    assert!(h.engine.checkout(license.id, CheckoutOptions::default()).is_err());
    assert!(h.machines.checkout(machine.id, CheckoutOptions::default()).is_err());
    assert!(h
        .machines
        .activate(license.key.as_str(), "fp-2", MachineAttributes::default())
        .is_err());

    // Deactivation still works so seats can be reclaimed.
    assert_eq!(h.machines.deactivate(machine.id).unwrap().machines_count, 0);
}

#[test]
fn expiry_renewal_cycle() {
    let h = harness_with(|p| {
        p.duration = 3_600;
        p.renewal_basis = tollgate_types::RenewalBasis::FromNowIfExpired;
    });
    let license = h.license();
    h.engine
        .checkout(license.id, CheckoutOptions::default())
        .unwrap();
    h.rewrite(license.id, |l| l.expiry = Some(Utc::now() - TimeDelta::minutes(1)));

    let result = h
        .engine
        .validate(license.id, &ValidationScope::default())
        .unwrap();
    assert_eq!(result.code, ValidationCode::Expired);

    let renewed = h.engine.renew(license.id).unwrap();
    assert_eq!(renewed.status, LicenseStatus::Active);
    let result = h
        .engine
        .validate(license.id, &ValidationScope::default())
        .unwrap();
    assert_eq!(result.code, ValidationCode::Valid);
}
