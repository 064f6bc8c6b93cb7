mod common;

use std::sync::OnceLock;

use chrono::{TimeDelta, TimeZone, Utc};
use common::{detached_license, harness_with};
use proptest::prelude::*;
use tollgate_crypto::Scheme;
use tollgate_license::{evaluator, LicenseError, ScopeMatch, ValidationCode};
use tollgate_types::{LicenseStatus, Policy, ProductId, RenewalBasis, TenantId};

fn base_policy() -> &'static Policy {
    static POLICY: OnceLock<Policy> = OnceLock::new();
    POLICY.get_or_init(|| {
        Policy::new(TenantId::new(), ProductId::new(), "props", Scheme::Ed25519Sign).unwrap()
    })
}

fn policy_with(configure: impl FnOnce(&mut Policy)) -> Policy {
    let mut policy = base_policy().clone();
    configure(&mut policy);
    policy
}

proptest! {
    #[test]
    fn create_expiry_is_created_plus_duration(duration in 1u64..10 * 365 * 86_400) {
        let policy = policy_with(|p| p.duration = duration);
        let now = Utc::now();
        let expiry = evaluator::initial_expiry(&policy, None, now).unwrap();
        prop_assert_eq!(expiry, Some(now + TimeDelta::seconds(duration as i64)));
    }

    #[test]
    fn renew_from_now_if_expired(
        duration in 1u64..365 * 86_400,
        offset in -100_000_000i64..100_000_000,
    ) {
        let policy = policy_with(|p| {
            p.duration = duration;
            p.renewal_basis = RenewalBasis::FromNowIfExpired;
        });
        let now = Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap();
        let expiry = now + TimeDelta::seconds(offset);
        let renewed = evaluator::renewed_expiry(&policy, Some(expiry), now).unwrap().unwrap();
        let step = TimeDelta::seconds(duration as i64);
        if now > expiry {
            prop_assert_eq!(renewed, now + step);
        } else {
            prop_assert_eq!(renewed, expiry + step);
        }
    }

    #[test]
    fn banned_is_always_banned(
        uses in 0u32..100,
        machines_count in 0u32..10,
        max_machines in 0u32..5,
        expired in any::<bool>(),
        require_check_in in any::<bool>(),
        scope in prop_oneof![
            Just(ScopeMatch::Unscoped),
            Just(ScopeMatch::Matched),
            Just(ScopeMatch::Unmatched),
        ],
    ) {
        let policy = policy_with(|p| {
            p.require_check_in = require_check_in;
            p.check_in_interval = Some(tollgate_types::CheckInInterval::Daily);
            p.max_machines = max_machines;
        });
        let now = Utc::now();
        let mut license = detached_license(&policy, now - TimeDelta::days(30));
        license.status = LicenseStatus::Banned;
        license.uses = uses;
        license.machines_count = machines_count;
        license.max_machines = max_machines;
        license.expiry = Some(if expired { now - TimeDelta::days(1) } else { now + TimeDelta::days(1) });

        let result = evaluator::validate(&policy, &license, scope, now);
        prop_assert!(!result.valid);
        prop_assert_eq!(result.code, ValidationCode::Banned);
    }

    #[test]
    fn clamp_stays_in_bounds(requested in proptest::option::of(any::<u64>())) {
        let config = tollgate_license::CheckoutConfig::default();
        let ttl = evaluator::clamp_ttl(&config, requested);
        prop_assert!(ttl >= config.minimum_ttl && ttl <= config.maximum_ttl);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn increment_then_decrement_restores_uses(start in 0u32..50, n in 1u32..50) {
        let h = harness_with(|p| p.max_uses = 100);
        let license = h.license();
        if start > 0 {
            h.engine.increment_usage(license.id, start).unwrap();
        }
        h.engine.increment_usage(license.id, n).unwrap();
        let restored = h.engine.decrement_usage(license.id, n).unwrap();
        prop_assert_eq!(restored.uses, start);
    }

    #[test]
    fn over_decrement_is_invalid_input(uses in 0u32..20, extra in 1u32..20) {
        let h = harness_with(|_| {});
        let license = h.license();
        if uses > 0 {
            h.engine.increment_usage(license.id, uses).unwrap();
        }
        let err = h.engine.decrement_usage(license.id, uses + extra).unwrap_err();
        let is_decrement = matches!(err, LicenseError::InvalidDecrement { .. });
        prop_assert!(is_decrement);
        prop_assert_eq!(err.kind(), tollgate_license::ErrorKind::InvalidInput);
    }
}
