//! Command-line front end for Tollgate.
//!
//! Offline commands (`keygen`, `sign`, `verify`, `decode`) need no store.
//! Everything else runs against a local SQLite file chosen with `--db`.

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tollgate_crypto::Scheme;
use tollgate_types::{MachineId, PolicyId};

pub use commands::run;

#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "Tollgate license administration")]
pub struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "TOLLGATE_DB", default_value = "tollgate.db")]
    pub db: PathBuf,

    /// Engine configuration (TOML)
    #[arg(long, global = true, env = "TOLLGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a key pair
    Keygen {
        #[arg(long, default_value = "ed25519")]
        scheme: Scheme,
    },
    /// Sign a JSON payload
    Sign {
        #[arg(long, default_value = "ed25519")]
        scheme: Scheme,
        /// File holding the encoded private key
        #[arg(long)]
        private_key: PathBuf,
        /// JSON document to sign
        #[arg(long)]
        payload: String,
    },
    /// Verify a signed token
    Verify {
        #[arg(long, default_value = "ed25519")]
        scheme: Scheme,
        /// File holding the encoded public key
        #[arg(long)]
        public_key: PathBuf,
        #[arg(long)]
        token: String,
    },
    /// Decode a certificate and optionally verify it
    Decode {
        /// Certificate file
        #[arg(long)]
        certificate: PathBuf,
        /// Decryption digest for encrypted certificates
        #[arg(long)]
        digest: Option<String>,
        /// File holding the issuing policy's public key
        #[arg(long)]
        public_key: Option<PathBuf>,
    },
    /// Create a tenant, product and policy
    Init(InitArgs),
    /// License operations
    #[command(subcommand)]
    License(LicenseCommand),
    /// Machine operations
    #[command(subcommand)]
    Machine(MachineCommand),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    #[arg(long)]
    pub tenant: String,
    #[arg(long)]
    pub product: String,
    #[arg(long, default_value = "default")]
    pub policy: String,
    #[arg(long, default_value = "ed25519")]
    pub scheme: Scheme,
    /// License duration in seconds (0 for perpetual)
    #[arg(long, default_value_t = 0)]
    pub duration: u64,
    /// 0 for unlimited
    #[arg(long, default_value_t = 0)]
    pub max_machines: u32,
    /// 0 for unlimited
    #[arg(long, default_value_t = 0)]
    pub max_uses: u32,
    /// Always encrypt certificates
    #[arg(long)]
    pub encrypted: bool,
}

/// Certificate options shared by license and machine checkout.
#[derive(Args, Debug, Clone, Copy)]
pub struct CheckoutArgs {
    /// Certificate lifetime in seconds
    #[arg(long)]
    pub ttl: Option<u64>,
    #[arg(long)]
    pub encrypt: bool,
}

/// A license is addressed by id or by key.
#[derive(Subcommand, Debug)]
pub enum LicenseCommand {
    /// Issue a new license
    Create {
        #[arg(long)]
        policy: PolicyId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        max_machines: Option<u32>,
        #[arg(long)]
        max_uses: Option<u32>,
        /// RFC 3339 expiry
        #[arg(long)]
        expiry: Option<String>,
    },
    /// Show a license
    Show { license: String },
    /// Validate a license
    Validate {
        license: String,
        /// Require this fingerprint to be activated
        #[arg(long)]
        fingerprint: Option<String>,
    },
    /// Issue a signed license certificate
    Checkout {
        license: String,
        #[command(flatten)]
        options: CheckoutArgs,
    },
    Suspend { license: String },
    Reinstate { license: String },
    Renew { license: String },
    CheckIn { license: String },
    /// Record usage
    Increment {
        license: String,
        #[arg(long, default_value_t = 1)]
        by: u32,
    },
    Decrement {
        license: String,
        #[arg(long, default_value_t = 1)]
        by: u32,
    },
    ResetUsage { license: String },
}

#[derive(Subcommand, Debug)]
pub enum MachineCommand {
    /// Activate a fingerprint against a license key
    Activate {
        #[arg(long)]
        key: String,
        #[arg(long)]
        fingerprint: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        hostname: Option<String>,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        cores: Option<u32>,
    },
    /// List machines of a license
    List { license: String },
    Deactivate { id: MachineId },
    /// Move a machine to another license
    Move {
        id: MachineId,
        #[arg(long)]
        key: String,
    },
    /// Issue a signed machine certificate
    Checkout {
        id: MachineId,
        #[command(flatten)]
        options: CheckoutArgs,
    },
    Ping { id: MachineId },
    ResetHeartbeat { id: MachineId },
    /// Report heartbeat liveness
    Status { id: MachineId },
}
