//! Storage setup and initialization

use anyhow::{Context, Result};
use stowage_core::AppConfig;
use stowage_storage::StorageService;

/// Load the storage setup file and configure every storage in it.
pub fn setup_storage(config: &AppConfig) -> Result<StorageService> {
    tracing::info!(
        path = %config.storage_config_path.display(),
        "Initializing storage registry..."
    );

    let setup = config
        .load_storage_setup()
        .context("Invalid storage configuration")?;
    let service = StorageService::from_setup(&setup).context("Failed to configure storages")?;

    tracing::info!(
        storages = %service.registry().names().collect::<Vec<_>>().join(","),
        default = %service.registry().default_name(),
        "Storage registry initialized successfully"
    );

    Ok(service)
}
