//! SQLite-based store implementation.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tollgate_crypto::KeyPair;
use tollgate_types::{
    License, LicenseId, LicenseKey, LicenseStatus, Machine, MachineAttributes, MachineId,
    Metadata, Policy, PolicyId, Product, ProductId, Tenant, TenantId,
};
use tracing::debug;

use crate::{LicenseTransition, Store, StoreError, StoreResult};

const LICENSE_COLUMNS: &str = "id, tenant_id, product_id, policy_id, name, key, status, uses, \
     machines_count, max_machines, max_uses, max_users, expiry, last_check_in_at, \
     last_checkout_at, metadata, created_at, updated_at";

const MACHINE_COLUMNS: &str = "id, license_id, fingerprint, ip, hostname, platform, name, cores, \
     last_heartbeat_at, last_checkout_at, metadata, created_at, updated_at";

const POLICY_COLUMNS: &str = "id, tenant_id, product_id, name, scheme, private_key, public_key, \
     duration, max_machines, max_uses, max_users, check_in_interval, require_check_in, \
     expiration_strategy, expiration_basis, renewal_basis, overage_strategy, \
     heartbeat_duration, require_heartbeat, heartbeat_basis, heartbeat_cull_strategy, \
     heartbeat_resurrection_strategy, encrypted, protected, metadata, created_at, updated_at";

/// SQLite-backed [`Store`].
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS policies (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                product_id TEXT NOT NULL REFERENCES products(id),
                name TEXT NOT NULL,
                scheme TEXT NOT NULL,
                private_key TEXT NOT NULL,
                public_key TEXT NOT NULL,
                duration INTEGER NOT NULL DEFAULT 0,
                max_machines INTEGER NOT NULL DEFAULT 0,
                max_uses INTEGER NOT NULL DEFAULT 0,
                max_users INTEGER NOT NULL DEFAULT 0,
                check_in_interval TEXT,
                require_check_in INTEGER NOT NULL DEFAULT 0,
                expiration_strategy TEXT NOT NULL,
                expiration_basis TEXT NOT NULL,
                renewal_basis TEXT NOT NULL,
                overage_strategy TEXT NOT NULL,
                heartbeat_duration INTEGER NOT NULL,
                require_heartbeat INTEGER NOT NULL DEFAULT 0,
                heartbeat_basis TEXT NOT NULL,
                heartbeat_cull_strategy TEXT NOT NULL,
                heartbeat_resurrection_strategy TEXT NOT NULL,
                encrypted INTEGER NOT NULL DEFAULT 0,
                protected INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS licenses (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                product_id TEXT NOT NULL REFERENCES products(id),
                policy_id TEXT NOT NULL REFERENCES policies(id),
                name TEXT,
                key TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                uses INTEGER NOT NULL DEFAULT 0 CHECK (uses >= 0),
                machines_count INTEGER NOT NULL DEFAULT 0 CHECK (machines_count >= 0),
                max_machines INTEGER NOT NULL DEFAULT 0,
                max_uses INTEGER NOT NULL DEFAULT 0,
                max_users INTEGER NOT NULL DEFAULT 0,
                expiry TEXT,
                last_check_in_at TEXT,
                last_checkout_at TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS machines (
                id TEXT PRIMARY KEY,
                license_id TEXT NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
                fingerprint TEXT NOT NULL,
                ip TEXT,
                hostname TEXT,
                platform TEXT,
                name TEXT,
                cores INTEGER,
                last_heartbeat_at TEXT,
                last_checkout_at TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(license_id, fingerprint)
            );

            CREATE INDEX IF NOT EXISTS idx_licenses_policy ON licenses(policy_id);
            CREATE INDEX IF NOT EXISTS idx_machines_license ON machines(license_id);
            "#,
        )?;

        debug!("License store schema initialized");
        Ok(())
    }
}

// ── Column codecs ────────────────────────────────────────────────

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn opt_ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(ts)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Reads a text column and parses it with `FromStr`.
fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn opt_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn metadata(row: &Row<'_>, idx: usize) -> rusqlite::Result<Metadata> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn license_from_row(row: &Row<'_>) -> rusqlite::Result<License> {
    Ok(License {
        id: parsed(row, 0)?,
        tenant_id: parsed(row, 1)?,
        product_id: parsed(row, 2)?,
        policy_id: parsed(row, 3)?,
        name: row.get(4)?,
        key: LicenseKey::from(row.get::<_, String>(5)?),
        status: parsed(row, 6)?,
        uses: row.get(7)?,
        machines_count: row.get(8)?,
        max_machines: row.get(9)?,
        max_uses: row.get(10)?,
        max_users: row.get(11)?,
        expiry: opt_time(row, 12)?,
        last_check_in_at: opt_time(row, 13)?,
        last_checkout_at: opt_time(row, 14)?,
        metadata: metadata(row, 15)?,
        created_at: time(row, 16)?,
        updated_at: time(row, 17)?,
    })
}

fn machine_from_row(row: &Row<'_>) -> rusqlite::Result<Machine> {
    Ok(Machine {
        id: parsed(row, 0)?,
        license_id: parsed(row, 1)?,
        fingerprint: row.get(2)?,
        ip: row.get(3)?,
        hostname: row.get(4)?,
        platform: row.get(5)?,
        name: row.get(6)?,
        cores: row.get(7)?,
        last_heartbeat_at: opt_time(row, 8)?,
        last_checkout_at: opt_time(row, 9)?,
        metadata: metadata(row, 10)?,
        created_at: time(row, 11)?,
        updated_at: time(row, 12)?,
    })
}

fn policy_from_row(row: &Row<'_>) -> rusqlite::Result<Policy> {
    Ok(Policy {
        id: parsed(row, 0)?,
        tenant_id: parsed(row, 1)?,
        product_id: parsed(row, 2)?,
        name: row.get(3)?,
        scheme: parsed(row, 4)?,
        keys: KeyPair::new(row.get(5)?, row.get(6)?),
        duration: row.get(7)?,
        max_machines: row.get(8)?,
        max_uses: row.get(9)?,
        max_users: row.get(10)?,
        check_in_interval: opt_parsed(row, 11)?,
        require_check_in: row.get(12)?,
        expiration_strategy: parsed(row, 13)?,
        expiration_basis: parsed(row, 14)?,
        renewal_basis: parsed(row, 15)?,
        overage_strategy: parsed(row, 16)?,
        heartbeat_duration: row.get(17)?,
        require_heartbeat: row.get(18)?,
        heartbeat_basis: parsed(row, 19)?,
        heartbeat_cull_strategy: parsed(row, 20)?,
        heartbeat_resurrection_strategy: parsed(row, 21)?,
        encrypted: row.get(22)?,
        protected: row.get(23)?,
        metadata: metadata(row, 24)?,
        created_at: time(row, 25)?,
        updated_at: time(row, 26)?,
    })
}

// ── Transaction helpers ──────────────────────────────────────────

fn load_license(conn: &Connection, id: LicenseId) -> StoreResult<Option<License>> {
    let sql = format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], license_from_row)
        .optional()?)
}

fn require_license(conn: &Connection, id: LicenseId) -> StoreResult<License> {
    load_license(conn, id)?.ok_or_else(|| StoreError::not_found("license", id))
}

/// Increments `machines_count` unless it would pass `limit`.
fn claim_machine_slot(tx: &Transaction<'_>, id: LicenseId, limit: Option<u32>) -> StoreResult<()> {
    let claimed: Option<u32> = tx
        .query_row(
            "UPDATE licenses SET machines_count = machines_count + 1, updated_at = ?2
             WHERE id = ?1 AND (?3 IS NULL OR machines_count + 1 <= ?3)
             RETURNING machines_count",
            params![id.to_string(), ts(Utc::now()), limit],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(count) = claimed {
        debug!(license_id = %id, machines_count = count, "Machine slot claimed");
        return Ok(());
    }
    match (limit, load_license(tx, id)?) {
        (Some(limit), Some(_)) => Err(StoreError::LimitExceeded {
            counter: "machines",
            limit,
        }),
        _ => Err(StoreError::not_found("license", id)),
    }
}

fn release_machine_slot(tx: &Transaction<'_>, id: LicenseId) -> StoreResult<()> {
    let released = tx.execute(
        "UPDATE licenses SET machines_count = machines_count - 1, updated_at = ?2
         WHERE id = ?1 AND machines_count > 0",
        params![id.to_string(), ts(Utc::now())],
    )?;
    if released == 0 {
        return Err(match load_license(tx, id)? {
            Some(_) => StoreError::Underflow {
                counter: "machines_count",
                current: 0,
                requested: 1,
            },
            None => StoreError::not_found("license", id),
        });
    }
    Ok(())
}

impl Store for SqliteStore {
    // ── Tenants & products ───────────────────────────────────────

    fn insert_tenant(&self, tenant: &Tenant) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tenants (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![tenant.id.to_string(), tenant.name, ts(tenant.created_at)],
        )
        .map_err(|e| StoreError::from_insert(e, "tenant already exists"))?;
        Ok(())
    }

    fn get_tenant(&self, id: TenantId) -> StoreResult<Option<Tenant>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id, name, created_at FROM tenants WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(Tenant {
                        id: parsed(row, 0)?,
                        name: row.get(1)?,
                        created_at: time(row, 2)?,
                    })
                },
            )
            .optional()?)
    }

    fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO products (id, tenant_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                product.id.to_string(),
                product.tenant_id.to_string(),
                product.name,
                ts(product.created_at),
            ],
        )
        .map_err(|e| StoreError::from_insert(e, "product already exists"))?;
        Ok(())
    }

    fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id, tenant_id, name, created_at FROM products WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(Product {
                        id: parsed(row, 0)?,
                        tenant_id: parsed(row, 1)?,
                        name: row.get(2)?,
                        created_at: time(row, 3)?,
                    })
                },
            )
            .optional()?)
    }

    // ── Policies ─────────────────────────────────────────────────

    fn insert_policy(&self, policy: &Policy) -> StoreResult<()> {
        let conn = self.lock()?;
        let sql = format!(
            "INSERT INTO policies ({POLICY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, \
             ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, \
             ?26, ?27)"
        );
        conn.execute(
            &sql,
            params![
                policy.id.to_string(),
                policy.tenant_id.to_string(),
                policy.product_id.to_string(),
                policy.name,
                policy.scheme.as_str(),
                policy.keys.private_key(),
                policy.keys.public_key(),
                policy.duration,
                policy.max_machines,
                policy.max_uses,
                policy.max_users,
                policy.check_in_interval.map(|i| i.as_str()),
                policy.require_check_in,
                policy.expiration_strategy.as_str(),
                policy.expiration_basis.as_str(),
                policy.renewal_basis.as_str(),
                policy.overage_strategy.as_str(),
                policy.heartbeat_duration,
                policy.require_heartbeat,
                policy.heartbeat_basis.as_str(),
                policy.heartbeat_cull_strategy.as_str(),
                policy.heartbeat_resurrection_strategy.as_str(),
                policy.encrypted,
                policy.protected,
                serde_json::to_string(&policy.metadata)?,
                ts(policy.created_at),
                ts(policy.updated_at),
            ],
        )
        .map_err(|e| StoreError::from_insert(e, "policy already exists"))?;
        debug!(policy_id = %policy.id, scheme = %policy.scheme, "Policy inserted");
        Ok(())
    }

    fn get_policy(&self, id: PolicyId) -> StoreResult<Option<Policy>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {POLICY_COLUMNS} FROM policies WHERE id = ?1");
        Ok(conn
            .query_row(&sql, [id.to_string()], policy_from_row)
            .optional()?)
    }

    fn update_policy(&self, policy: &Policy) -> StoreResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE policies SET name = ?2, scheme = ?3, private_key = ?4, public_key = ?5,
                duration = ?6, max_machines = ?7, max_uses = ?8, max_users = ?9,
                check_in_interval = ?10, require_check_in = ?11, expiration_strategy = ?12,
                expiration_basis = ?13, renewal_basis = ?14, overage_strategy = ?15,
                heartbeat_duration = ?16, require_heartbeat = ?17, heartbeat_basis = ?18,
                heartbeat_cull_strategy = ?19, heartbeat_resurrection_strategy = ?20,
                encrypted = ?21, protected = ?22, metadata = ?23, updated_at = ?24
             WHERE id = ?1",
            params![
                policy.id.to_string(),
                policy.name,
                policy.scheme.as_str(),
                policy.keys.private_key(),
                policy.keys.public_key(),
                policy.duration,
                policy.max_machines,
                policy.max_uses,
                policy.max_users,
                policy.check_in_interval.map(|i| i.as_str()),
                policy.require_check_in,
                policy.expiration_strategy.as_str(),
                policy.expiration_basis.as_str(),
                policy.renewal_basis.as_str(),
                policy.overage_strategy.as_str(),
                policy.heartbeat_duration,
                policy.require_heartbeat,
                policy.heartbeat_basis.as_str(),
                policy.heartbeat_cull_strategy.as_str(),
                policy.heartbeat_resurrection_strategy.as_str(),
                policy.encrypted,
                policy.protected,
                serde_json::to_string(&policy.metadata)?,
                ts(policy.updated_at),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("policy", policy.id));
        }
        Ok(())
    }

    // ── Licenses ─────────────────────────────────────────────────

    fn insert_license(&self, license: &License) -> StoreResult<()> {
        let conn = self.lock()?;
        let sql = format!(
            "INSERT INTO licenses ({LICENSE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, \
             ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        );
        conn.execute(
            &sql,
            params![
                license.id.to_string(),
                license.tenant_id.to_string(),
                license.product_id.to_string(),
                license.policy_id.to_string(),
                license.name,
                license.key.as_str(),
                license.status.as_str(),
                license.uses,
                license.machines_count,
                license.max_machines,
                license.max_uses,
                license.max_users,
                opt_ts(license.expiry),
                opt_ts(license.last_check_in_at),
                opt_ts(license.last_checkout_at),
                serde_json::to_string(&license.metadata)?,
                ts(license.created_at),
                ts(license.updated_at),
            ],
        )
        .map_err(|e| StoreError::from_insert(e, "license id or key already exists"))?;
        debug!(license_id = %license.id, "License inserted");
        Ok(())
    }

    fn get_license(&self, id: LicenseId) -> StoreResult<Option<License>> {
        let conn = self.lock()?;
        load_license(&conn, id)
    }

    fn find_license_by_key(&self, key: &str) -> StoreResult<Option<License>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE key = ?1");
        Ok(conn.query_row(&sql, [key], license_from_row).optional()?)
    }

    fn transition_license(
        &self,
        id: LicenseId,
        change: &LicenseTransition,
    ) -> StoreResult<Option<License>> {
        let conn = self.lock()?;
        let sql = format!(
            "UPDATE licenses SET status = ?2, expiry = ?3, updated_at = ?4
             WHERE id = ?1 AND status = ?5 AND expiry IS ?6
             RETURNING {LICENSE_COLUMNS}"
        );
        let updated = conn
            .query_row(
                &sql,
                params![
                    id.to_string(),
                    change.status.as_str(),
                    opt_ts(change.expiry),
                    ts(change.at),
                    change.expected_status.as_str(),
                    opt_ts(change.expected_expiry),
                ],
                license_from_row,
            )
            .optional()?;

        match updated {
            Some(license) => {
                debug!(license_id = %id, status = %license.status, "License transitioned");
                Ok(Some(license))
            }
            None if load_license(&conn, id)?.is_some() => {
                debug!(license_id = %id, "License transition lost a race");
                Ok(None)
            }
            None => Err(StoreError::not_found("license", id)),
        }
    }

    fn record_check_in(&self, id: LicenseId, at: DateTime<Utc>) -> StoreResult<License> {
        let conn = self.lock()?;
        let sql = format!(
            "UPDATE licenses SET last_check_in_at = ?2, updated_at = ?2
             WHERE id = ?1
             RETURNING {LICENSE_COLUMNS}"
        );
        conn.query_row(&sql, params![id.to_string(), ts(at)], license_from_row)
            .optional()?
            .ok_or_else(|| StoreError::not_found("license", id))
    }

    fn record_license_checkout(
        &self,
        id: LicenseId,
        expected: LicenseStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<License>> {
        let conn = self.lock()?;
        let sql = format!(
            "UPDATE licenses SET last_checkout_at = ?2, updated_at = ?2,
                status = CASE WHEN status = ?4 THEN ?5 ELSE status END
             WHERE id = ?1 AND status = ?3
             RETURNING {LICENSE_COLUMNS}"
        );
        let updated = conn
            .query_row(
                &sql,
                params![
                    id.to_string(),
                    ts(at),
                    expected.as_str(),
                    LicenseStatus::NotActivated.as_str(),
                    LicenseStatus::Active.as_str(),
                ],
                license_from_row,
            )
            .optional()?;

        match updated {
            Some(license) => Ok(Some(license)),
            None if load_license(&conn, id)?.is_some() => Ok(None),
            None => Err(StoreError::not_found("license", id)),
        }
    }

    fn increment_uses(&self, id: LicenseId, n: u32, limit: Option<u32>) -> StoreResult<License> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let uses: Option<u32> = tx
            .query_row(
                "UPDATE licenses SET uses = uses + ?2, updated_at = ?3
                 WHERE id = ?1 AND (?4 IS NULL OR uses + ?2 <= ?4)
                 RETURNING uses",
                params![id.to_string(), n, ts(Utc::now()), limit],
                |row| row.get(0),
            )
            .optional()?;

        let Some(uses) = uses else {
            return Err(match (limit, load_license(&tx, id)?) {
                (_, None) => StoreError::not_found("license", id),
                (Some(limit), Some(_)) => StoreError::LimitExceeded {
                    counter: "uses",
                    limit,
                },
                (None, Some(_)) => {
                    StoreError::InvalidData("unguarded increment matched no row".to_string())
                }
            });
        };

        let license = require_license(&tx, id)?;
        tx.commit()?;
        debug!(license_id = %id, uses, "Uses incremented");
        Ok(license)
    }

    fn decrement_uses(&self, id: LicenseId, n: u32) -> StoreResult<License> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let uses: Option<u32> = tx
            .query_row(
                "UPDATE licenses SET uses = uses - ?2, updated_at = ?3
                 WHERE id = ?1 AND uses >= ?2
                 RETURNING uses",
                params![id.to_string(), n, ts(Utc::now())],
                |row| row.get(0),
            )
            .optional()?;

        if uses.is_none() {
            let current = require_license(&tx, id)?;
            return Err(StoreError::Underflow {
                counter: "uses",
                current: current.uses,
                requested: n,
            });
        }

        let license = require_license(&tx, id)?;
        tx.commit()?;
        debug!(license_id = %id, uses = license.uses, "Uses decremented");
        Ok(license)
    }

    fn reset_uses(&self, id: LicenseId) -> StoreResult<License> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE licenses SET uses = 0, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), ts(Utc::now())],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("license", id));
        }
        let license = require_license(&tx, id)?;
        tx.commit()?;
        Ok(license)
    }

    // ── Machines ─────────────────────────────────────────────────

    fn get_machine(&self, id: MachineId) -> StoreResult<Option<Machine>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {MACHINE_COLUMNS} FROM machines WHERE id = ?1");
        Ok(conn
            .query_row(&sql, [id.to_string()], machine_from_row)
            .optional()?)
    }

    fn find_machine(
        &self,
        license_id: LicenseId,
        fingerprint: &str,
    ) -> StoreResult<Option<Machine>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {MACHINE_COLUMNS} FROM machines WHERE license_id = ?1 AND fingerprint = ?2"
        );
        Ok(conn
            .query_row(
                &sql,
                params![license_id.to_string(), fingerprint],
                machine_from_row,
            )
            .optional()?)
    }

    fn list_machines(&self, license_id: LicenseId) -> StoreResult<Vec<Machine>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {MACHINE_COLUMNS} FROM machines WHERE license_id = ?1 ORDER BY created_at"
        );
        let mut stmt = conn.prepare(&sql)?;
        let machines = stmt
            .query_map([license_id.to_string()], machine_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(machines)
    }

    fn update_machine_attributes(
        &self,
        id: MachineId,
        attrs: &MachineAttributes,
    ) -> StoreResult<Machine> {
        let conn = self.lock()?;
        let metadata = attrs
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let sql = format!(
            "UPDATE machines SET ip = COALESCE(?2, ip), hostname = COALESCE(?3, hostname),
                platform = COALESCE(?4, platform), name = COALESCE(?5, name),
                cores = COALESCE(?6, cores), metadata = COALESCE(?7, metadata),
                updated_at = ?8
             WHERE id = ?1
             RETURNING {MACHINE_COLUMNS}"
        );
        conn.query_row(
            &sql,
            params![
                id.to_string(),
                attrs.ip,
                attrs.hostname,
                attrs.platform,
                attrs.name,
                attrs.cores,
                metadata,
                ts(Utc::now()),
            ],
            machine_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("machine", id))
    }

    fn set_heartbeat(&self, id: MachineId, at: Option<DateTime<Utc>>) -> StoreResult<Machine> {
        let conn = self.lock()?;
        let sql = format!(
            "UPDATE machines SET last_heartbeat_at = ?2, updated_at = ?3
             WHERE id = ?1
             RETURNING {MACHINE_COLUMNS}"
        );
        conn.query_row(
            &sql,
            params![id.to_string(), opt_ts(at), ts(Utc::now())],
            machine_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("machine", id))
    }

    fn record_machine_checkout(&self, id: MachineId, at: DateTime<Utc>) -> StoreResult<Machine> {
        let conn = self.lock()?;
        let sql = format!(
            "UPDATE machines SET last_checkout_at = ?2, updated_at = ?2
             WHERE id = ?1
             RETURNING {MACHINE_COLUMNS}"
        );
        conn.query_row(&sql, params![id.to_string(), ts(at)], machine_from_row)
            .optional()?
            .ok_or_else(|| StoreError::not_found("machine", id))
    }

    fn insert_machine(&self, machine: &Machine, limit: Option<u32>) -> StoreResult<License> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        claim_machine_slot(&tx, machine.license_id, limit)?;

        let sql = format!(
            "INSERT INTO machines ({MACHINE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, \
             ?9, ?10, ?11, ?12, ?13)"
        );
        tx.execute(
            &sql,
            params![
                machine.id.to_string(),
                machine.license_id.to_string(),
                machine.fingerprint,
                machine.ip,
                machine.hostname,
                machine.platform,
                machine.name,
                machine.cores,
                opt_ts(machine.last_heartbeat_at),
                opt_ts(machine.last_checkout_at),
                serde_json::to_string(&machine.metadata)?,
                ts(machine.created_at),
                ts(machine.updated_at),
            ],
        )
        .map_err(|e| StoreError::from_insert(e, "fingerprint already associated with license"))?;

        let license = require_license(&tx, machine.license_id)?;
        tx.commit()?;
        debug!(
            machine_id = %machine.id,
            license_id = %machine.license_id,
            "Machine inserted"
        );
        Ok(license)
    }

    fn move_machine(
        &self,
        machine: &Machine,
        from: LicenseId,
        limit: Option<u32>,
    ) -> StoreResult<License> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        claim_machine_slot(&tx, machine.license_id, limit)?;
        release_machine_slot(&tx, from)?;

        let moved = tx
            .execute(
                "UPDATE machines SET license_id = ?2, updated_at = ?3
                 WHERE id = ?1 AND license_id = ?4",
                params![
                    machine.id.to_string(),
                    machine.license_id.to_string(),
                    ts(machine.updated_at),
                    from.to_string(),
                ],
            )
            .map_err(|e| {
                StoreError::from_insert(e, "fingerprint already associated with license")
            })?;
        if moved == 0 {
            return Err(StoreError::not_found("machine", machine.id));
        }

        let license = require_license(&tx, machine.license_id)?;
        tx.commit()?;
        debug!(
            machine_id = %machine.id,
            from = %from,
            to = %machine.license_id,
            "Machine moved"
        );
        Ok(license)
    }

    fn delete_machine(&self, id: MachineId) -> StoreResult<License> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let license_id: Option<LicenseId> = tx
            .query_row(
                "DELETE FROM machines WHERE id = ?1 RETURNING license_id",
                [id.to_string()],
                |row| parsed(row, 0),
            )
            .optional()?;
        let license_id = license_id.ok_or_else(|| StoreError::not_found("machine", id))?;

        release_machine_slot(&tx, license_id)?;
        let license = require_license(&tx, license_id)?;
        tx.commit()?;
        debug!(machine_id = %id, license_id = %license_id, "Machine deleted");
        Ok(license)
    }
}
