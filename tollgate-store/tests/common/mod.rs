use chrono::Utc;
use tollgate_crypto::Scheme;
use tollgate_store::{SqliteStore, Store};
use tollgate_types::{
    License, LicenseId, LicenseKey, LicenseStatus, Metadata, Policy, Product, Tenant,
};

pub struct Fixture {
    pub store: SqliteStore,
    pub policy: Policy,
}

pub fn fixture() -> Fixture {
    let store = SqliteStore::open_in_memory().unwrap();
    let policy = seed_policy(&store);
    Fixture { store, policy }
}

pub fn seed_policy(store: &impl Store) -> Policy {
    let tenant = Tenant::new("acme");
    let product = Product::new(tenant.id, "widget");
    store.insert_tenant(&tenant).unwrap();
    store.insert_product(&product).unwrap();
    let policy = Policy::new(tenant.id, product.id, "standard", Scheme::Ed25519Sign).unwrap();
    store.insert_policy(&policy).unwrap();
    policy
}

pub fn new_license(policy: &Policy) -> License {
    let now = Utc::now();
    License {
        id: LicenseId::new(),
        tenant_id: policy.tenant_id,
        product_id: policy.product_id,
        policy_id: policy.id,
        name: None,
        key: LicenseKey::generate(),
        status: LicenseStatus::NotActivated,
        uses: 0,
        machines_count: 0,
        max_machines: policy.max_machines,
        max_uses: policy.max_uses,
        max_users: policy.max_users,
        expiry: None,
        last_check_in_at: None,
        last_checkout_at: None,
        metadata: Metadata::new(),
        created_at: now,
        updated_at: now,
    }
}

pub fn stored_license(f: &Fixture) -> License {
    let license = new_license(&f.policy);
    f.store.insert_license(&license).unwrap();
    license
}
