use crate::broadcast::MetadataBroadcast;
use crate::catalog::{CatalogInvariantManager, CatalogSettings, SetlistManager};
use crate::config::{AppConfig, EnrichmentSettings, ImportSettings, DEFAULT_BROADCAST_CAPACITY};
use crate::error::SetlistResult;
use crate::import::BulkImportEngine;
use crate::membership::ListMembershipService;
use crate::reorder::DEFAULT_DEBOUNCE;
use crate::songs::{EnrichmentDispatcher, SongBpmClient, SongRegistry, TempoEnricher};
use crate::store::{SetlistStore, SqliteSetlistStore};
use crate::view::{ListFocus, ListSession, SessionServices};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The parts of [`AppConfig`] the services need, without the database location.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub catalog: CatalogSettings,
    pub import: ImportSettings,
    pub debounce: Duration,
    pub broadcast_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            catalog: CatalogSettings::default(),
            import: ImportSettings::default(),
            debounce: DEFAULT_DEBOUNCE,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            catalog: config.catalog.clone(),
            import: config.import,
            debounce: config.debounce,
            broadcast_capacity: config.broadcast_capacity,
        }
    }
}

fn build_enricher(settings: Option<&EnrichmentSettings>) -> Result<Option<Arc<dyn TempoEnricher>>> {
    if cfg!(feature = "no_enrichment") {
        info!("Tempo enrichment compiled out");
        return Ok(None);
    }
    let Some(settings) = settings else {
        return Ok(None);
    };
    let client = SongBpmClient::new(
        &settings.api_url,
        &settings.api_key,
        &settings.user_agent,
        settings.timeout_sec,
    )?;
    info!("Tempo enrichment enabled via {}", settings.api_url);
    Ok(Some(Arc::new(client)))
}

/// All services of one database, wired together.
#[derive(Clone)]
pub struct SetlistEngine {
    store: Arc<dyn SetlistStore>,
    broadcast: MetadataBroadcast,
    catalog: Arc<CatalogInvariantManager>,
    setlists: SetlistManager,
    registry: SongRegistry,
    membership: ListMembershipService,
    bulk: BulkImportEngine,
    session_services: SessionServices,
}

impl SetlistEngine {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let store = SqliteSetlistStore::new(&config.db_path)?;
        info!("Opened setlist database {:?}", config.db_path);
        let enricher = build_enricher(config.enrichment.as_ref())?;
        Ok(Self::with_store(Arc::new(store), config.into(), enricher))
    }

    pub fn with_store(
        store: Arc<dyn SetlistStore>,
        settings: EngineSettings,
        enricher: Option<Arc<dyn TempoEnricher>>,
    ) -> Self {
        let broadcast = MetadataBroadcast::new(settings.broadcast_capacity);
        let catalog = Arc::new(CatalogInvariantManager::new(
            store.clone(),
            settings.catalog,
        ));
        let enrichment = EnrichmentDispatcher::new(enricher, store.clone(), broadcast.clone());
        let registry = SongRegistry::new(store.clone(), broadcast.clone(), enrichment);
        let membership =
            ListMembershipService::new(store.clone(), catalog.clone(), broadcast.clone());
        let bulk = BulkImportEngine::new(
            store.clone(),
            catalog.clone(),
            registry.clone(),
            membership.clone(),
            settings.import.batch_size,
        );
        let session_services = SessionServices {
            store: store.clone(),
            broadcast: broadcast.clone(),
            catalog: catalog.clone(),
            registry: registry.clone(),
            membership: membership.clone(),
            bulk: bulk.clone(),
            import_limits: settings.import.limits,
            debounce: settings.debounce,
            focus: ListFocus::default(),
        };
        Self {
            setlists: SetlistManager::new(store.clone(), catalog.clone()),
            store,
            broadcast,
            catalog,
            registry,
            membership,
            bulk,
            session_services,
        }
    }

    pub fn store(&self) -> &Arc<dyn SetlistStore> {
        &self.store
    }

    pub fn broadcast(&self) -> &MetadataBroadcast {
        &self.broadcast
    }

    pub fn catalog(&self) -> &CatalogInvariantManager {
        &self.catalog
    }

    pub fn setlists(&self) -> &SetlistManager {
        &self.setlists
    }

    pub fn registry(&self) -> &SongRegistry {
        &self.registry
    }

    pub fn membership(&self) -> &ListMembershipService {
        &self.membership
    }

    pub fn bulk(&self) -> &BulkImportEngine {
        &self.bulk
    }

    /// Opens a list, taking the focus from whichever list was open before.
    pub async fn open_list(&self, band_id: &str, list_id: &str) -> SetlistResult<ListSession> {
        ListSession::open(self.session_services.clone(), band_id, list_id).await
    }
}
