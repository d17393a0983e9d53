//! Application wiring: builds every remote service from the configuration

mod actions;

use crate::catalogue::HttpCatalogue;
use crate::config::{Config, Paths};
use crate::db::Database;
use crate::import::{ImportEngine, ImportServices};
use crate::nexus::{NexusApi, NexusRestClient};
use crate::remote::{HttpClient, HttpContentStore, HttpRelay, HttpTelemetry, LogTelemetry, TelemetrySink};
use crate::updates::{HttpClassicUpdates, HttpModMaker, UpdateReconciler};

use anyhow::{Context, Result};
use std::sync::Arc;

/// Main application struct that orchestrates all components
pub struct App {
    pub config: Config,
    pub paths: Paths,

    /// Identification catalogue cache
    pub db: Arc<Database>,

    catalogue: Arc<HttpCatalogue>,
    engine: ImportEngine,
    updates: UpdateReconciler,
}

impl App {
    /// Create a new App instance
    pub async fn new(config: Config, paths: Paths) -> Result<Self> {
        paths.ensure_dirs().context("Failed to create directories")?;

        let db = Database::open(&paths.database_file()).context("Failed to open catalogue cache")?;
        let db = Arc::new(db);

        let http = HttpClient::new(config.http_timeout())?;
        let endpoints = &config.endpoints;

        let catalogue = Arc::new(HttpCatalogue::new(
            http.clone(),
            db.clone(),
            endpoints.size_hash_url.clone(),
            endpoints.directory_url.clone(),
            config.cache_ttl(),
        ));

        let telemetry: Arc<dyn TelemetrySink> = if config.telemetry_enabled {
            Arc::new(HttpTelemetry::new(http.clone(), endpoints.telemetry_url.clone()))
        } else {
            Arc::new(LogTelemetry)
        };

        let services = ImportServices {
            catalogue: catalogue.clone(),
            content: Arc::new(HttpContentStore::new(
                http.clone(),
                &endpoints.manifest_base_url,
                &endpoints.transform_base_url,
            )?),
            relay: Arc::new(HttpRelay::new(http.clone(), &endpoints.relay_url)?),
            telemetry,
        };

        // Initialize Nexus API client if API key is available
        let nexus = config.nexus_api_key().and_then(|key| {
            NexusRestClient::new(key, &endpoints.nexus_api_base, config.http_timeout())
                .map(|client| Arc::new(client) as Arc<dyn NexusApi>)
                .map_err(|e| {
                    tracing::warn!("Failed to initialize Nexus API client: {}", e);
                    e
                })
                .ok()
        });
        if nexus.is_none() {
            tracing::debug!("No Nexus API key configured; Nexus update checks are disabled");
        }

        let updates = UpdateReconciler::new(
            Arc::new(HttpClassicUpdates::new(http.clone(), endpoints.classic_updates_url.clone())),
            Arc::new(HttpModMaker::new(http, endpoints.modmaker_url.clone())),
            nexus,
        );

        Ok(Self {
            config,
            paths,
            db,
            catalogue,
            engine: ImportEngine::new(services),
            updates,
        })
    }
}
