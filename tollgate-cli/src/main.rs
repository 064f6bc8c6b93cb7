//! Tollgate administration CLI.
//!
//! Usage:
//!   tollgate keygen --scheme ed25519
//!   tollgate --db tollgate.db init --tenant acme --product widget
//!   tollgate --db tollgate.db license checkout <LICENSE>
//!
//! Every command prints a JSON document on stdout; logs go to stderr.

use anyhow::Result;
use clap::Parser;
use tollgate_cli::{run, Cli};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let output = run(cli)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
