use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::core::catalog::{CatalogConnector, EntityCatalog};
use crate::core::location::AccessorTransfer;
use crate::core::transfer_engine::{TransferEngine, TransferSpawner};
use crate::db::{self, SqliteConnector};
use crate::events::EventHub;
use crate::hooks::{self, Registered};
use crate::session::Session;
use crate::simulation::SimulatedStudio;

/// Everything a client process wires together at startup.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub hub: EventHub,
    pub session: Session,
    pub spawner: TransferSpawner,
    pub registered: Registered,
}

impl AppContext {
    /// Open the catalog, register every hook and configure the session's
    /// locations.
    pub async fn bootstrap(config: AppConfig) -> anyhow::Result<Self> {
        let hub = EventHub::new();

        let (catalog, connector, studio): (
            Arc<dyn EntityCatalog>,
            Arc<dyn CatalogConnector>,
            Option<SimulatedStudio>,
        ) = if config.simulation {
            let root = std::env::temp_dir().join(format!("multisite-sim-{}", std::process::id()));
            let studio = SimulatedStudio::seed(&root)
                .await
                .context("Failed to seed simulation")?;
            info!(root = %root.display(), "Running in simulation mode");
            (
                Arc::new(studio.catalog()),
                Arc::new(studio.connector()),
                Some(studio),
            )
        } else {
            if let Some(parent) = config.database_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let catalog = db::init(&config.database_path)
                .await
                .context("Failed to open catalog database")?;
            (
                Arc::new(catalog),
                Arc::new(SqliteConnector::new(config.database_path.clone())),
                None,
            )
        };

        let session = Session::new(config.api_user.clone(), catalog);
        let service = AccessorTransfer {
            verify: config.verify_transfers,
        };
        let spawner = TransferSpawner::new(TransferEngine::new(connector, Arc::new(service)));

        let registered = hooks::register_all(&hub, &session, spawner.clone(), &config).await?;
        if let Some(studio) = &studio {
            studio.subscribe(&hub).await;
        }

        session.configure_locations(&hub).await;

        Ok(Self {
            config: Arc::new(config),
            hub,
            session,
            spawner,
            registered,
        })
    }
}
