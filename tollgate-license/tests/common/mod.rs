#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tollgate_crypto::Scheme;
use tollgate_license::{CreateLicense, EngineConfig, LicenseEngine, MachineManager};
use tollgate_store::{LicenseTransition, SqliteStore, Store};
use tollgate_types::{License, LicenseId, Metadata, Policy, Product, Tenant};

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub engine: LicenseEngine<SqliteStore>,
    pub machines: MachineManager<SqliteStore>,
    pub policy: Policy,
}

impl Harness {
    /// Creates a license under the harness policy.
    pub fn license(&self) -> License {
        self.engine
            .create(CreateLicense::for_policy(&self.policy))
            .unwrap()
    }

    /// Forces status, expiry or check-in time straight into the store.
    pub fn rewrite(&self, id: LicenseId, edit: impl FnOnce(&mut License)) -> License {
        let current = self.store.get_license(id).unwrap().unwrap();
        let mut edited = current.clone();
        edit(&mut edited);
        if edited.last_check_in_at != current.last_check_in_at
            && let Some(at) = edited.last_check_in_at
        {
            self.store.record_check_in(id, at).unwrap();
        }
        let change = LicenseTransition::from_current(&current, Utc::now())
            .status(edited.status)
            .expiry(edited.expiry);
        self.store.transition_license(id, &change).unwrap().unwrap()
    }
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn harness_with(configure: impl FnOnce(&mut Policy)) -> Harness {
    harness_with_scheme(Scheme::Ed25519Sign, configure)
}

pub fn harness_with_scheme(scheme: Scheme, configure: impl FnOnce(&mut Policy)) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let tenant = Tenant::new("acme");
    let product = Product::new(tenant.id, "widget");
    store.insert_tenant(&tenant).unwrap();
    store.insert_product(&product).unwrap();

    let mut policy = Policy::new(tenant.id, product.id, "standard", scheme).unwrap();
    configure(&mut policy);
    store.insert_policy(&policy).unwrap();

    Harness {
        engine: LicenseEngine::new(Arc::clone(&store), EngineConfig::default()),
        machines: MachineManager::new(Arc::clone(&store), EngineConfig::default()),
        store,
        policy,
    }
}

/// A license record that is never persisted, for evaluator tests.
pub fn detached_license(policy: &Policy, created_at: DateTime<Utc>) -> License {
    License {
        id: LicenseId::new(),
        tenant_id: policy.tenant_id,
        product_id: policy.product_id,
        policy_id: policy.id,
        name: None,
        key: tollgate_types::LicenseKey::generate(),
        status: tollgate_types::LicenseStatus::NotActivated,
        uses: 0,
        machines_count: 0,
        max_machines: policy.max_machines,
        max_uses: policy.max_uses,
        max_users: policy.max_users,
        expiry: None,
        last_check_in_at: None,
        last_checkout_at: None,
        metadata: Metadata::new(),
        created_at,
        updated_at: created_at,
    }
}

/// Asserts two instants are within a couple of seconds of each other.
pub fn assert_close(a: DateTime<Utc>, b: DateTime<Utc>) {
    let delta = (a - b).num_milliseconds().abs();
    assert!(delta < 2_000, "{a} and {b} differ by {delta}ms");
}
