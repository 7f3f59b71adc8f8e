//! Node configuration.
//!
//! Settings come from an optional JSON file and are then overridden by command
//! line flags. Every field has a default, so an empty file (or no file at all)
//! yields a working node.
//!
//! Without `bus` the node runs on a simulated bus populated from `simulate`.
//! A `bus` device path needs a build with the `linux-i2c` feature.
//!
//! ```json
//! {
//!   "state_dir": "/var/lib/modnode",
//!   "bind": "0.0.0.0:8080",
//!   "advertise": "192.168.4.20",
//!   "scan_interval_ms": 500,
//!   "bus": "/dev/i2c-1",
//!   "mappings": { "0x50": "Relay" },
//!   "simulate": { "0x48": "Relay", "0x4f": "TemperatureSensor" }
//! }
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use modnode_core::constants::{
    DEFAULT_COORDINATOR_PORT, DEFAULT_HTTP_PORT, DEFAULT_MAX_RETRIES, DEFAULT_NETWORK_TIMEOUT_MS,
    DEFAULT_REPORT_PATH, DEFAULT_RETRY_DELAY_MS, DEFAULT_SCAN_INTERVAL_MS,
};
use modnode_core::{BusAddress, ModuleKind};
use modnode_manager::{AddressMapping, ReporterConfig, ScannerConfig};
use modnode_network::{ApiServerConfig, CoordinatorClientConfig};
use modnode_storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command line flags.
#[derive(Debug, Parser)]
#[command(
    name = "modnode",
    author,
    version,
    about = "Peripheral node: bus scanning, module lifecycle and coordinator reporting",
    long_about = None
)]
pub struct Args {
    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the module registry and network credentials
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Address of the local HTTP API
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// IP the coordinator uses to reach this node
    #[arg(long, value_name = "IP")]
    pub advertise: Option<String>,

    /// Coordinator host, instead of the one in the stored credentials
    #[arg(long, value_name = "HOST")]
    pub coordinator: Option<String>,

    /// Time between two bus scans
    #[arg(long, value_name = "MS")]
    pub scan_interval_ms: Option<u64>,

    /// I²C character device, e.g. /dev/i2c-1 (needs the linux-i2c feature)
    #[arg(long, value_name = "DEVICE")]
    pub bus: Option<PathBuf>,

    /// Simulated device on the bus (repeatable)
    #[arg(long = "simulate", value_name = "ADDR=KIND")]
    pub simulate: Vec<String>,
}

/// Settings of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub state_dir: PathBuf,
    pub bind: SocketAddr,
    /// Node IP sent in report URLs; defaults to the bind IP or loopback
    pub advertise: Option<String>,
    pub coordinator: Option<String>,
    pub coordinator_port: u16,
    pub report_path: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub network_timeout_ms: u64,
    pub scan_interval_ms: u64,
    /// Extra address to kind mappings, e.g. `"0x50": "Relay"`
    pub mappings: BTreeMap<String, String>,
    /// I²C device path; the bus is simulated when absent
    pub bus: Option<PathBuf>,
    /// Devices attached to the simulated bus
    pub simulate: BTreeMap<String, String>,
    /// Raw battery ADC reading of the simulated gauge; no gauge when absent
    pub battery_raw: Option<u16>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("."),
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_HTTP_PORT)),
            advertise: None,
            coordinator: None,
            coordinator_port: DEFAULT_COORDINATOR_PORT,
            report_path: DEFAULT_REPORT_PATH.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            network_timeout_ms: DEFAULT_NETWORK_TIMEOUT_MS,
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            mappings: BTreeMap::new(),
            bus: None,
            simulate: BTreeMap::new(),
            battery_raw: None,
        }
    }
}

fn parse_entry(address: &str, kind: &str) -> Result<(BusAddress, ModuleKind)> {
    let address: BusAddress = address
        .parse()
        .with_context(|| format!("invalid bus address {address:?}"))?;
    let kind: ModuleKind = kind
        .parse()
        .with_context(|| format!("invalid module kind {kind:?}"))?;
    Ok((address, kind))
}

impl NodeConfig {
    /// Read a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Configuration file (if any) with flag overrides applied.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(args)?;
        Ok(config)
    }

    /// Override fields with the flags that were given.
    pub fn apply(&mut self, args: &Args) -> Result<()> {
        if let Some(dir) = &args.state_dir {
            self.state_dir = dir.clone();
        }
        if let Some(bind) = args.bind {
            self.bind = bind;
        }
        if let Some(advertise) = &args.advertise {
            self.advertise = Some(advertise.clone());
        }
        if let Some(coordinator) = &args.coordinator {
            self.coordinator = Some(coordinator.clone());
        }
        if let Some(interval) = args.scan_interval_ms {
            self.scan_interval_ms = interval;
        }
        if let Some(bus) = &args.bus {
            self.bus = Some(bus.clone());
        }
        for entry in &args.simulate {
            let (address, kind) = entry
                .split_once('=')
                .with_context(|| format!("expected ADDR=KIND, got {entry:?}"))?;
            self.simulate
                .insert(address.trim().to_string(), kind.trim().to_string());
        }
        Ok(())
    }

    /// Default mapping extended with the configured entries.
    pub fn mapping(&self) -> Result<AddressMapping> {
        let mut mapping = AddressMapping::default();
        for (address, kind) in &self.mappings {
            let (address, kind) = parse_entry(address, kind)?;
            mapping.insert(address, kind);
        }
        Ok(mapping)
    }

    /// Devices to attach to the simulated bus, by ascending address.
    pub fn simulated_devices(&self) -> Result<Vec<(BusAddress, ModuleKind)>> {
        let mut devices = self
            .simulate
            .iter()
            .map(|(address, kind)| parse_entry(address, kind))
            .collect::<Result<Vec<_>>>()?;
        devices.sort();
        Ok(devices)
    }

    /// `<ip>:<port>` the coordinator uses to reach the HTTP API.
    pub fn callback_url(&self) -> String {
        let ip = match &self.advertise {
            Some(ip) => ip.clone(),
            None if self.bind.ip().is_unspecified() => Ipv4Addr::LOCALHOST.to_string(),
            None => self.bind.ip().to_string(),
        };
        format!("{ip}:{}", self.bind.port())
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig::new(&self.state_dir)
    }

    pub fn server_config(&self) -> ApiServerConfig {
        ApiServerConfig::new(self.bind)
    }

    pub fn client_config(&self) -> CoordinatorClientConfig {
        CoordinatorClientConfig::default().timeout(self.network_timeout())
    }

    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig::default().interval(Duration::from_millis(self.scan_interval_ms))
    }

    pub fn reporter_config(&self) -> ReporterConfig {
        let config = ReporterConfig::new(self.callback_url())
            .port(self.coordinator_port)
            .path(self.report_path.clone())
            .max_retries(self.max_retries)
            .retry_delay(Duration::from_millis(self.retry_delay_ms));
        match &self.coordinator {
            Some(host) => config.coordinator(host.clone()),
            None => config,
        }
    }

    fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn args(flags: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("modnode").chain(flags.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.coordinator_port, 5002);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.scan_interval_ms, 1000);
        assert_eq!(config.callback_url(), "127.0.0.1:8080");
        assert_eq!(config.mapping().unwrap(), AddressMapping::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(
            &path,
            r#"{"advertise": "192.168.4.20", "mappings": {"0x50": "relay"}}"#,
        )
        .unwrap();

        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.callback_url(), "192.168.4.20:8080");
        assert_eq!(config.retry_delay_ms, 2000);
        assert_eq!(
            config.mapping().unwrap().kind_for(BusAddress::new(0x50).unwrap()),
            Some(ModuleKind::Relay)
        );
    }

    #[test]
    fn test_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(&path, r#"{"scan_interval_ms": 250, "bind": "127.0.0.1:9000"}"#).unwrap();

        let path = path.to_string_lossy().into_owned();
        let config = NodeConfig::from_args(&args(&[
            "--config",
            &path,
            "--scan-interval-ms",
            "50",
            "--coordinator",
            "10.0.0.1",
            "--simulate",
            "0x4f=TemperatureSensor",
            "--simulate",
            "73=Led",
        ]))
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.callback_url(), "127.0.0.1:9000");
        assert_eq!(config.coordinator.as_deref(), Some("10.0.0.1"));
        // Clamped by the scanner.
        assert_eq!(config.scanner_config().interval, Duration::from_millis(100));
        assert_eq!(
            config.simulated_devices().unwrap(),
            vec![
                (BusAddress::new(0x49).unwrap(), ModuleKind::Led),
                (BusAddress::new(0x4f).unwrap(), ModuleKind::TemperatureSensor),
            ]
        );
    }

    #[rstest]
    #[case("0x50", "Toaster")]
    #[case("0x02", "Relay")]
    #[case("relay", "Relay")]
    fn test_bad_mapping_rejected(#[case] address: &str, #[case] kind: &str) {
        let config = NodeConfig {
            mappings: BTreeMap::from([(address.to_string(), kind.to_string())]),
            ..NodeConfig::default()
        };
        assert!(config.mapping().is_err());
    }

    #[test]
    fn test_bus_from_file_and_flag() {
        let config: NodeConfig = serde_json::from_str(r#"{"bus": "/dev/i2c-0"}"#).unwrap();
        assert_eq!(config.bus, Some(PathBuf::from("/dev/i2c-0")));

        let mut config = config;
        config.apply(&args(&["--bus", "/dev/i2c-1"])).unwrap();
        assert_eq!(config.bus, Some(PathBuf::from("/dev/i2c-1")));
        assert_eq!(NodeConfig::default().bus, None);
    }

    #[test]
    fn test_simulate_requires_separator() {
        let mut config = NodeConfig::default();
        assert!(config.apply(&args(&["--simulate", "0x48"])).is_err());
    }

    #[test]
    fn test_reporter_config() {
        let config = NodeConfig {
            advertise: Some("10.1.1.5".to_string()),
            coordinator: Some("10.1.1.1".to_string()),
            ..NodeConfig::default()
        };
        let reporter = config.reporter_config();
        assert_eq!(reporter.callback_url, "10.1.1.5:8080");
        assert_eq!(reporter.coordinator.as_deref(), Some("10.1.1.1"));
        assert_eq!(reporter.port, 5002);
    }
}
