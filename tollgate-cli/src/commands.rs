use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tollgate_crypto::Scheme;
use tollgate_license::{
    Checkout, CheckoutOptions, CreateLicense, EngineConfig, LicenseEngine, MachineManager,
    ValidationScope,
};
use tollgate_store::{SqliteStore, Store};
use tollgate_types::{License, LicenseId, MachineAttributes, Policy, Product, Tenant};
use tracing::{debug, info};

use crate::{CheckoutArgs, Cli, Command, InitArgs, LicenseCommand, MachineCommand};

/// Executes a parsed command line, returning the document to print.
pub fn run(cli: Cli) -> Result<Value> {
    match cli.command {
        Command::Keygen { scheme } => keygen(scheme),
        Command::Sign {
            scheme,
            private_key,
            payload,
        } => sign(scheme, &private_key, &payload),
        Command::Verify {
            scheme,
            public_key,
            token,
        } => verify(scheme, &public_key, &token),
        Command::Decode {
            certificate,
            digest,
            public_key,
        } => decode(&certificate, digest.as_deref(), public_key.as_deref()),
        Command::Init(args) => {
            let store = open_store(&cli.db)?;
            init(&store, args)
        }
        Command::License(command) => {
            let store = open_store(&cli.db)?;
            let config = load_config(cli.config.as_deref())?;
            let engine = LicenseEngine::new(Arc::clone(&store), config);
            license(&store, &engine, command)
        }
        Command::Machine(command) => {
            let store = open_store(&cli.db)?;
            let config = load_config(cli.config.as_deref())?;
            let engine = LicenseEngine::new(Arc::clone(&store), config.clone());
            let machines = MachineManager::new(store, config);
            machine(&engine, &machines, command)
        }
    }
}

fn open_store(path: &Path) -> Result<Arc<SqliteStore>> {
    debug!(path = %path.display(), "Opening store");
    let store = SqliteStore::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn read_key(path: &Path) -> Result<String> {
    let key = fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    Ok(key.trim().to_string())
}

// ── Offline ──────────────────────────────────────────────────────

fn keygen(scheme: Scheme) -> Result<Value> {
    let keys = scheme.generate_key_pair()?;
    Ok(json!({
        "scheme": scheme,
        "private_key": keys.private_key(),
        "public_key": keys.public_key(),
    }))
}

fn sign(scheme: Scheme, private_key: &Path, payload: &str) -> Result<Value> {
    let payload: Value = serde_json::from_str(payload).context("payload is not valid JSON")?;
    let token = scheme.sign_json(&read_key(private_key)?, &payload)?;
    Ok(json!({ "scheme": scheme, "token": token }))
}

fn verify(scheme: Scheme, public_key: &Path, token: &str) -> Result<Value> {
    let verification = scheme.verify(&read_key(public_key)?, token)?;
    let data = String::from_utf8_lossy(&verification.data);
    let payload = serde_json::from_str::<Value>(&data)
        .unwrap_or_else(|_| Value::String(data.to_string()));
    Ok(json!({ "valid": verification.valid, "payload": payload }))
}

fn decode(certificate: &Path, digest: Option<&str>, public_key: Option<&Path>) -> Result<Value> {
    let text = fs::read_to_string(certificate)
        .with_context(|| format!("failed to read certificate {}", certificate.display()))?;
    let cert = tollgate_crypto::decode(&text, digest)?;
    let payload: Value = cert.payload()?;

    let valid = match public_key {
        Some(path) => Some(cert.verify(&read_key(path)?)?.valid),
        None => None,
    };
    Ok(json!({
        "kind": cert.kind,
        "alg": cert.alg,
        "valid": valid,
        "payload": payload,
    }))
}

// ── Store setup ──────────────────────────────────────────────────

fn init(store: &SqliteStore, args: InitArgs) -> Result<Value> {
    let tenant = Tenant::new(args.tenant);
    let product = Product::new(tenant.id, args.product);
    let mut policy = Policy::new(tenant.id, product.id, args.policy, args.scheme)?;
    policy.duration = args.duration;
    policy.max_machines = args.max_machines;
    policy.max_uses = args.max_uses;
    policy.encrypted = args.encrypted;

    store.insert_tenant(&tenant)?;
    store.insert_product(&product)?;
    store.insert_policy(&policy)?;
    info!(
        tenant_id = %tenant.id,
        product_id = %product.id,
        policy_id = %policy.id,
        scheme = %policy.scheme,
        "Initialised policy"
    );

    Ok(json!({
        "tenant_id": tenant.id,
        "product_id": product.id,
        "policy_id": policy.id,
        "scheme": policy.scheme,
        "public_key": policy.public_key(),
    }))
}

// ── Licenses ─────────────────────────────────────────────────────

/// Resolves an id or a key to a license.
fn resolve(engine: &LicenseEngine<SqliteStore>, reference: &str) -> Result<License> {
    let license = match LicenseId::parse(reference) {
        Ok(id) => engine.get_license(id)?,
        Err(_) => engine.find_by_key(reference)?,
    };
    Ok(license)
}

fn checkout_json(checkout: &Checkout) -> Value {
    json!({
        "certificate": checkout.certificate,
        "digest": checkout.digest,
        "ttl": checkout.ttl,
        "issued_at": checkout.issued_at,
        "expires_at": checkout.expires_at,
    })
}

impl From<CheckoutArgs> for CheckoutOptions {
    fn from(args: CheckoutArgs) -> Self {
        Self {
            ttl: args.ttl,
            encrypt: args.encrypt,
        }
    }
}

fn license(
    store: &SqliteStore,
    engine: &LicenseEngine<SqliteStore>,
    command: LicenseCommand,
) -> Result<Value> {
    let license = match command {
        LicenseCommand::Create {
            policy,
            name,
            max_machines,
            max_uses,
            expiry,
        } => {
            let expiry = match expiry {
                Some(raw) => Some(
                    DateTime::parse_from_rfc3339(&raw)
                        .with_context(|| format!("invalid expiry {raw}"))?
                        .with_timezone(&Utc),
                ),
                None => None,
            };
            let Some(policy) = store.get_policy(policy)? else {
                bail!("policy not found: {policy}");
            };
            let mut params = CreateLicense::for_policy(&policy);
            params.name = name;
            params.overrides.max_machines = max_machines;
            params.overrides.max_uses = max_uses;
            params.expiry = expiry;
            engine.create(params)?
        }
        LicenseCommand::Show { license } => resolve(engine, &license)?,
        LicenseCommand::Validate {
            license,
            fingerprint,
        } => {
            let id = resolve(engine, &license)?.id;
            let result = engine.validate(id, &ValidationScope { fingerprint })?;
            return Ok(serde_json::to_value(result)?);
        }
        LicenseCommand::Checkout { license, options } => {
            let id = resolve(engine, &license)?.id;
            let checkout = engine.checkout(id, options.into())?;
            return Ok(checkout_json(&checkout));
        }
        LicenseCommand::Suspend { license } => engine.suspend(resolve(engine, &license)?.id)?,
        LicenseCommand::Reinstate { license } => engine.reinstate(resolve(engine, &license)?.id)?,
        LicenseCommand::Renew { license } => engine.renew(resolve(engine, &license)?.id)?,
        LicenseCommand::CheckIn { license } => engine.check_in(resolve(engine, &license)?.id)?,
        LicenseCommand::Increment { license, by } => {
            engine.increment_usage(resolve(engine, &license)?.id, by)?
        }
        LicenseCommand::Decrement { license, by } => {
            engine.decrement_usage(resolve(engine, &license)?.id, by)?
        }
        LicenseCommand::ResetUsage { license } => {
            engine.reset_usage(resolve(engine, &license)?.id)?
        }
    };
    Ok(serde_json::to_value(license)?)
}

// ── Machines ─────────────────────────────────────────────────────

fn machine(
    engine: &LicenseEngine<SqliteStore>,
    machines: &MachineManager<SqliteStore>,
    command: MachineCommand,
) -> Result<Value> {
    let value = match command {
        MachineCommand::Activate {
            key,
            fingerprint,
            name,
            hostname,
            platform,
            ip,
            cores,
        } => {
            let attrs = MachineAttributes {
                ip,
                hostname,
                platform,
                name,
                cores,
                metadata: None,
            };
            serde_json::to_value(machines.activate(&key, &fingerprint, attrs)?)?
        }
        MachineCommand::List { license } => {
            let id = resolve(engine, &license)?.id;
            serde_json::to_value(machines.list_machines(id)?)?
        }
        MachineCommand::Deactivate { id } => serde_json::to_value(machines.deactivate(id)?)?,
        MachineCommand::Move { id, key } => {
            serde_json::to_value(machines.update(id, MachineAttributes::default(), Some(&key))?)?
        }
        MachineCommand::Checkout { id, options } => {
            checkout_json(&machines.checkout(id, options.into())?)
        }
        MachineCommand::Ping { id } => serde_json::to_value(machines.ping(id)?)?,
        MachineCommand::ResetHeartbeat { id } => {
            serde_json::to_value(machines.reset_heartbeat(id)?)?
        }
        MachineCommand::Status { id } => {
            json!({ "id": id, "heartbeat": machines.heartbeat_status(id)? })
        }
    };
    Ok(value)
}
