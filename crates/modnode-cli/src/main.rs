//! `modnode`: peripheral node binary.
//!
//! Scans the bus (simulated unless `--bus` names an I²C device), serves the
//! local HTTP API and reports the module inventory to the coordinator until
//! Ctrl+C. When the coordinator stays
//! unreachable the stored credentials are wiped and the process exits with
//! [`RESET_EXIT_CODE`] so the supervisor restarts it unprovisioned.
//!
//! Log verbosity follows `RUST_LOG` (default `info`).
//!
//! Usage:
//!   modnode --state-dir /var/lib/modnode --advertise 192.168.4.20 \
//!     --simulate 0x48=Relay --simulate 0x4f=TemperatureSensor
//!
//!   modnode --state-dir /var/lib/modnode --bus /dev/i2c-1   # linux-i2c feature

mod config;
mod node;

use anyhow::Result;
use clap::Parser;
use config::{Args, NodeConfig};
use node::Exit;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status asking the supervisor for a restart.
const RESET_EXIT_CODE: u8 = 3;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging();

    let config = NodeConfig::from_args(&args)?;
    tracing::debug!(?config, "Configuration loaded");

    match node::run(config).await? {
        Exit::Shutdown => Ok(ExitCode::SUCCESS),
        Exit::Reset => Ok(ExitCode::from(RESET_EXIT_CODE)),
    }
}
