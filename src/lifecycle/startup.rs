//! Startup orchestration.
//!
//! Order: config → logging → metrics → chains → wallets → store → pipeline
//! → recovery → workers → HTTP. Any startup error is fatal. The listener
//! binds last, so traffic only arrives once recovery has run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::blockchain::{ChainError, ChainRegistry};
use crate::config::{load_or_default, ConfigError, ServiceConfig};
use crate::error::SettlementError;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::signals::spawn_signal_handler;
use crate::lifecycle::Shutdown;
use crate::observability::{init_logging, init_metrics};
use crate::payments::{PaymentGatewayAdapter, StaticCatalog};
use crate::settlement::worker::queue;
use crate::settlement::{
    CampaignLedger, FileSettlementStore, HttpLedger, InMemoryLedger, RecoveryReport,
    SettlementPipeline, SettlementStore, SettlementWorker,
};
use crate::wallet::{WalletError, WalletStore};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("chain setup: {0}")]
    Chain(#[from] ChainError),

    #[error("wallet store: {0}")]
    Wallet(#[from] WalletError),

    #[error("settlement setup: {0}")]
    Settlement(#[from] SettlementError),

    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Collaborators that can be replaced, e.g. by tests.
pub struct Components {
    pub registry: ChainRegistry,
    pub wallets: Arc<WalletStore>,
    pub store: Arc<dyn SettlementStore>,
    pub ledger: Arc<dyn CampaignLedger>,
}

impl Components {
    /// Production collaborators for `config`.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, StartupError> {
        let registry = ChainRegistry::connect(&config.chains).await?;
        tracing::info!(chains = ?registry.chains(), "Chain clients connected");

        let wallets = Arc::new(WalletStore::from_config(&config.wallet)?);
        tracing::info!(wallets = wallets.len(), "Wallet store loaded");

        let store: Arc<dyn SettlementStore> = match &config.settlement.store_path {
            Some(path) => Arc::new(FileSettlementStore::load_from_file(path)?),
            None => {
                tracing::warn!("No settlement store path configured, requests are kept in memory only");
                Arc::new(FileSettlementStore::in_memory())
            }
        };

        let ledger: Arc<dyn CampaignLedger> = match &config.ledger.webhook_url {
            Some(url) => Arc::new(HttpLedger::new(
                url.clone(),
                std::time::Duration::from_secs(config.ledger.timeout_secs),
            )?),
            None => Arc::new(InMemoryLedger::new()),
        };

        Ok(Self {
            registry,
            wallets,
            store,
            ledger,
        })
    }
}

/// A wired service, ready to serve.
pub struct Service {
    pub state: AppState,
    pub recovery: RecoveryReport,
    worker: SettlementWorker,
}

impl Service {
    /// Wire the pipeline, run recovery and prepare the workers.
    pub async fn assemble(config: ServiceConfig, components: Components) -> Result<Self, StartupError> {
        let config = Arc::new(config);
        let (sender, receiver) = queue(config.settlement.queue_capacity);

        let pipeline = Arc::new(SettlementPipeline::new(
            components.registry,
            components.wallets,
            components.store,
            components.ledger,
            config.settlement.clone(),
            sender,
        ));

        let recovery = pipeline.recover().await?;
        tracing::info!(
            requeued = recovery.requeued,
            interrupted = recovery.interrupted,
            ledger_pending = recovery.ledger_pending,
            "Recovery complete"
        );

        let worker = SettlementWorker::new(
            pipeline.clone(),
            receiver,
            config.settlement.workers,
            config.settlement.receipt_timeout(),
        );

        let catalog = Arc::new(StaticCatalog::new(config.projects.clone()));
        let gateway = Arc::new(PaymentGatewayAdapter::new(
            pipeline.clone(),
            catalog,
            config.gateway.clone(),
        ));

        Ok(Self {
            state: AppState {
                pipeline,
                gateway,
                config,
            },
            recovery,
            worker,
        })
    }

    /// Start workers and serve HTTP on `listener` until `shutdown` fires.
    pub async fn serve(self, listener: TcpListener, shutdown: Arc<Shutdown>) -> Result<(), StartupError> {
        let worker = tokio::spawn(self.worker.run(shutdown.subscribe()));
        let server = HttpServer::new(self.state);

        let result = server.run(listener, shutdown.subscribe()).await;
        shutdown.trigger();
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Settlement worker task failed");
        }
        result.map_err(StartupError::from)
    }
}

/// Run the service from a config file until SIGINT or SIGTERM.
pub async fn run(config_path: &Path) -> Result<(), StartupError> {
    let config = load_or_default(config_path)?;

    init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "stake-settlement starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let components = Components::from_config(&config).await?;
    let bind_address = config.server.bind_address.clone();
    let service = Service::assemble(config, components).await?;

    let listener = TcpListener::bind(&bind_address).await?;
    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    service.serve(listener, shutdown).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("settlement.toml")
}
