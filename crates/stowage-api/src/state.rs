//! Application state shared by all handlers.

use stowage_core::AppConfig;
use stowage_storage::StorageService;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub storage: StorageService,
}

impl AppState {
    pub fn new(config: AppConfig, storage: StorageService) -> Self {
        AppState { config, storage }
    }
}
