use std::sync::Arc;

use crate::engine::draft_engine::DraftEngine;

use super::champions::{CatalogConfig, ChampionCatalog};

/// Shared state for every HTTP handler.
pub struct AppState {
    pub engine: Arc<DraftEngine>,
    pub catalog: Arc<ChampionCatalog>,
}

impl AppState {
    pub fn new(engine: Arc<DraftEngine>, catalog_config: CatalogConfig) -> Arc<Self> {
        Arc::new(Self {
            engine,
            catalog: ChampionCatalog::new(catalog_config),
        })
    }
}
