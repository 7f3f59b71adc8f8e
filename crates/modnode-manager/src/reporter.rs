//! Coordinator reporter.
//!
//! Keeps the coordinator's view of this node in sync with the live module
//! table. Every published module list becomes one report: a JSON array of
//! `{"PeripheralType", "Uuid", "Url"}` entries posted to the coordinator.
//!
//! # Retry and recovery
//!
//! A report is attempted up to `max_retries` times with a fixed delay between
//! attempts. When the whole budget is spent the node assumes its network
//! provisioning is stale: the stored credentials are deleted and the
//! [`NodeReset`] hook fires, once, so the node can come back up
//! unprovisioned.
//!
//! A node without a coordinator address skips reporting. That is not a
//! transport failure and never triggers recovery.
//!
//! # Examples
//!
//! ```no_run
//! use modnode_manager::{NodeReset, Reporter, ReporterConfig};
//! use modnode_network::CoordinatorClient;
//! use modnode_storage::CredentialStore;
//! use std::sync::Arc;
//!
//! struct Reboot;
//!
//! impl NodeReset for Reboot {
//!     fn reset(&self) {
//!         std::process::exit(1);
//!     }
//! }
//!
//! # async fn example(modules: Vec<modnode_core::ModuleInfo>) {
//! let reporter = Reporter::new(
//!     ReporterConfig::new("192.168.4.20:8080"),
//!     Arc::new(CoordinatorClient::default()),
//!     CredentialStore::in_memory(),
//!     Arc::new(Reboot),
//! );
//!
//! let outcome = reporter.report(&modules).await;
//! println!("{outcome:?}");
//! # }
//! ```

use crate::manager::ReportFeed;
use modnode_core::constants::{
    DEFAULT_COORDINATOR_PORT, DEFAULT_HTTP_PORT, DEFAULT_MAX_RETRIES, DEFAULT_REPORT_PATH,
    DEFAULT_RETRY_DELAY_MS,
};
use modnode_core::{Error, ModuleInfo};
use modnode_network::{ReportEntry, ReportTransport};
use modnode_storage::CredentialStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Hook invoked when the node has to restart unprovisioned.
pub trait NodeReset: Send + Sync {
    fn reset(&self);
}

/// Configuration for [`Reporter`]
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// `<node_ip>:<http_port>` sent as the `Url` of every entry
    pub callback_url: String,

    /// Coordinator host used instead of the one in the stored credentials
    pub coordinator: Option<String>,

    /// Coordinator TCP port
    pub port: u16,

    /// Coordinator endpoint
    pub path: String,

    /// Total attempts per report
    pub max_retries: u32,

    /// Fixed delay between two attempts
    pub retry_delay: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            callback_url: format!("127.0.0.1:{DEFAULT_HTTP_PORT}"),
            coordinator: None,
            port: DEFAULT_COORDINATOR_PORT,
            path: DEFAULT_REPORT_PATH.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl ReporterConfig {
    /// Create a configuration advertising `callback_url`.
    pub fn new(callback_url: impl Into<String>) -> Self {
        Self {
            callback_url: callback_url.into(),
            ..Default::default()
        }
    }

    /// Report to `host` regardless of the stored credentials.
    pub fn coordinator(mut self, host: impl Into<String>) -> Self {
        self.coordinator = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Result of one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The coordinator accepted the report.
    Delivered { attempts: u32 },
    /// No coordinator address is known.
    Skipped,
    /// Every attempt failed; recovery was triggered.
    Exhausted { attempts: u32 },
}

/// Sends the module list to the coordinator.
pub struct Reporter {
    config: ReporterConfig,
    transport: Arc<dyn ReportTransport>,
    credentials: CredentialStore,
    reset: Arc<dyn NodeReset>,
    reset_triggered: AtomicBool,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("config", &self.config)
            .field("reset_triggered", &self.reset_triggered)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    pub fn new(
        config: ReporterConfig,
        transport: Arc<dyn ReportTransport>,
        credentials: CredentialStore,
        reset: Arc<dyn NodeReset>,
    ) -> Self {
        Self {
            config,
            transport,
            credentials,
            reset,
            reset_triggered: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    /// Report entries for `modules`.
    pub fn entries(&self, modules: &[ModuleInfo]) -> Vec<ReportEntry> {
        modules
            .iter()
            .map(|module| {
                ReportEntry::new(
                    module.kind.as_str(),
                    module.id.clone(),
                    self.config.callback_url.as_str(),
                )
            })
            .collect()
    }

    /// Coordinator host: the configured override, else the stored
    /// credentials.
    pub async fn coordinator_host(&self) -> Option<String> {
        match &self.config.coordinator {
            Some(host) => Some(host.clone()),
            None => self.credentials.coordinator_address().await,
        }
    }

    /// Report `modules` to the coordinator resolved by
    /// [`coordinator_host`](Self::coordinator_host).
    pub async fn report(&self, modules: &[ModuleInfo]) -> ReportOutcome {
        let Some(host) = self.coordinator_host().await else {
            info!(modules = modules.len(), "No coordinator address, report skipped");
            return ReportOutcome::Skipped;
        };
        self.report_to(&host, self.config.port, &self.config.path, modules)
            .await
    }

    /// Report `modules` to `host:port` at `path` with retry.
    ///
    /// Exhausting the retry budget deletes the stored credentials and fires
    /// the reset hook.
    pub async fn report_to(
        &self,
        host: &str,
        port: u16,
        path: &str,
        modules: &[ModuleInfo],
    ) -> ReportOutcome {
        let entries = self.entries(modules);
        let max_attempts = self.config.max_retries.max(1);

        for attempt in 1..=max_attempts {
            match self.transport.send_report(host, port, path, &entries).await {
                Ok(()) => {
                    info!(host, port, attempt, modules = entries.len(), "Modules reported");
                    return ReportOutcome::Delivered { attempts: attempt };
                }
                Err(e) => {
                    warn!(host, port, attempt, max_attempts, error = %e, "Report attempt failed");
                    if attempt < max_attempts {
                        debug!(delay_ms = self.config.retry_delay.as_millis() as u64, "Retrying report");
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        let error = Error::CoordinatorUnreachable {
            attempts: max_attempts,
        };
        error!(host, port, error = %error, "Giving up on coordinator");
        self.recover().await;

        ReportOutcome::Exhausted {
            attempts: max_attempts,
        }
    }

    /// Whether the reset hook has fired.
    pub fn reset_triggered(&self) -> bool {
        self.reset_triggered.load(Ordering::SeqCst)
    }

    async fn recover(&self) {
        match self.credentials.delete().await {
            Ok(true) => info!("Stored credentials wiped"),
            Ok(false) => debug!("No stored credentials to wipe"),
            Err(e) => {
                let error = Error::from(e);
                warn!(error = %error, "Failed to wipe credentials");
            }
        }

        if self.reset_triggered.swap(true, Ordering::SeqCst) {
            debug!("Reset already triggered");
            return;
        }
        warn!("Resetting node");
        self.reset.reset();
    }

    /// Report every list published on `feed` until `shutdown` fires, the
    /// feed closes or recovery is triggered.
    ///
    /// Lists published while a report is in flight are coalesced; only the
    /// latest one is reported next.
    pub async fn run(self: Arc<Self>, mut feed: ReportFeed, shutdown: CancellationToken) {
        info!("Reporter started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Reporter shutting down");
                    break;
                }
                changed = feed.changed() => {
                    if changed.is_err() {
                        debug!("Module feed closed");
                        break;
                    }

                    let modules = feed.borrow_and_update().clone();
                    if let ReportOutcome::Exhausted { .. } = self.report(&modules).await {
                        break;
                    }
                }
            }
        }
    }
}
