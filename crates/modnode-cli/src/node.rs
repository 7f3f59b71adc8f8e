//! Task wiring for a running node.

use crate::config::NodeConfig;
use anyhow::{Context, Result, bail};
use modnode_core::ModuleKind;
use modnode_hardware::mock::{MockAdc, MockBus};
use modnode_hardware::{BatteryMonitor, Bus, DriverContext, bus};
#[cfg(feature = "linux-i2c")]
use modnode_hardware::HalBus;
#[cfg(feature = "linux-i2c")]
use linux_embedded_hal::I2cdev;
use modnode_manager::{BusScanner, LifecycleManager, NodeReset, Reporter};
use modnode_network::{ApiServer, CoordinatorClient, ModuleApi};
use modnode_storage::{CredentialStore, DocumentStore, ModuleRegistry};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How the node stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Stopped on request.
    Shutdown,
    /// The coordinator stayed unreachable; restart unprovisioned.
    Reset,
}

/// Reset hook: stops every task and remembers why.
#[derive(Debug, Default)]
pub struct ResetSignal {
    shutdown: CancellationToken,
    requested: AtomicBool,
}

impl ResetSignal {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            requested: AtomicBool::new(false),
        }
    }

    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

impl NodeReset for ResetSignal {
    fn reset(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }
}

/// Register contents a simulated device of `kind` answers with.
fn simulated_response(kind: ModuleKind) -> Vec<u8> {
    match kind {
        // 25.0 °C
        ModuleKind::TemperatureSensor => vec![0x19, 0x00],
        // Mid-scale ADC reading
        ModuleKind::GasSensor => vec![0x80],
        ModuleKind::Led | ModuleKind::Relay => Vec::new(),
    }
}

/// Open the I²C character device at `path`.
#[cfg(feature = "linux-i2c")]
fn open_bus(path: &Path) -> Result<HalBus<I2cdev>> {
    let i2c = I2cdev::new(path).with_context(|| format!("failed to open {}", path.display()))?;
    info!(path = %path.display(), "I2C bus opened");
    Ok(HalBus::new(i2c))
}

#[cfg(not(feature = "linux-i2c"))]
fn open_bus(path: &Path) -> Result<MockBus> {
    bail!(
        "cannot open {}: modnode was built without the linux-i2c feature",
        path.display()
    )
}

/// Bus populated with the configured simulated devices.
fn simulated_bus(config: &NodeConfig) -> Result<MockBus> {
    let (mock, devices) = MockBus::new();
    for (address, kind) in config.simulated_devices()? {
        info!(%address, %kind, "Simulated device attached");
        devices.attach(address, simulated_response(kind));
    }
    Ok(mock)
}

/// Run the node until Ctrl+C or a reset.
pub async fn run(config: NodeConfig) -> Result<Exit> {
    let storage = config.storage_config();
    let credentials =
        CredentialStore::new(DocumentStore::file(storage.credentials_path()));

    let provisioned = credentials
        .load()
        .await
        .context("failed to read network credentials")?
        .is_some();
    if !provisioned && config.coordinator.is_none() {
        bail!(
            "node is not provisioned: {} is missing and no coordinator is configured",
            storage.credentials_path().display()
        );
    }

    match &config.bus {
        Some(path) => {
            if !config.simulate.is_empty() {
                warn!("Simulated devices ignored on a hardware bus");
            }
            let bus = open_bus(path)?;
            run_on(config, credentials, bus).await
        }
        None => {
            let bus = simulated_bus(&config)?;
            run_on(config, credentials, bus).await
        }
    }
}

async fn run_on<B: Bus>(
    config: NodeConfig,
    credentials: CredentialStore,
    bus: B,
) -> Result<Exit> {
    let storage = config.storage_config();
    let battery = match config.battery_raw {
        Some(raw) => BatteryMonitor::new(MockAdc::new(raw)),
        None => BatteryMonitor::unavailable(),
    };
    let shared = bus::shared(bus);

    let registry = ModuleRegistry::open(DocumentStore::file(storage.registry_path())).await;
    let (manager, feed) = LifecycleManager::new(
        DriverContext::new(shared.clone(), battery),
        registry,
        config.mapping()?,
    );
    let manager = Arc::new(manager);

    let shutdown = CancellationToken::new();
    let reset = Arc::new(ResetSignal::new(shutdown.clone()));
    let mut tasks = JoinSet::new();

    let reporter = Arc::new(Reporter::new(
        config.reporter_config(),
        Arc::new(CoordinatorClient::new(config.client_config())),
        credentials,
        reset.clone(),
    ));
    tasks.spawn(reporter.run(feed, shutdown.clone()));

    manager.load_modules().await;

    let server = ApiServer::bind(config.server_config())
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let api: Arc<dyn ModuleApi> = manager.clone();
    tasks.spawn(server.serve(api, shutdown.clone()));

    let scanner = BusScanner::new(manager, shared, config.scanner_config());
    tasks.spawn(scanner.run(shutdown.clone()));

    info!(callback = %config.callback_url(), "Node running");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Shutdown requested");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Task failed");
        }
    }

    if reset.requested() {
        warn!("Node reset: restart to provision again");
        Ok(Exit::Reset)
    } else {
        info!("Node stopped");
        Ok(Exit::Shutdown)
    }
}
