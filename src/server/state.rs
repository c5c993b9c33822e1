use axum::extract::FromRef;
use std::sync::Arc;

use crate::catalog::{CatalogConnector, MetadataFetcher};
use crate::config::Config;
use crate::jobs::store::RetentionPolicy;
use crate::jobs::{JobLauncher, JobStore, ToolSpawner};

pub type GuardedConfig = Arc<Config>;
pub type GuardedFetcher = Arc<MetadataFetcher>;
pub type GuardedLauncher = Arc<JobLauncher>;

#[derive(Clone)]
pub struct ServerState {
    pub config: GuardedConfig,
    pub fetcher: GuardedFetcher,
    pub launcher: GuardedLauncher,
    pub store: JobStore,
}

impl ServerState {
    pub fn new(config: Config, connector: Arc<dyn CatalogConnector>, spawner: Arc<dyn ToolSpawner>) -> Self {
        let store = JobStore::new(RetentionPolicy::from(&config.retention));
        let fetcher = MetadataFetcher::new(connector.clone(), config.catalog.preview_track_limit);
        let launcher = JobLauncher::new(store.clone(), spawner, connector, config.tool.clone());

        Self {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            launcher: Arc::new(launcher),
            store,
        }
    }
}

impl FromRef<ServerState> for JobStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for GuardedConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
