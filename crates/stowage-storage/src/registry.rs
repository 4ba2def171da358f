//! Container registry
//!
//! Built once from a validated `StorageSetup` and immutable afterwards. Lookups
//! by name are linear over the configured order, which is also what decides the
//! default storage when none is named.

use crate::container::Container;
use crate::factory::create_driver;
use crate::traits::{StorageError, StorageResult};
use std::time::Instant;
use stowage_core::{DriverKind, StorageSetup};

pub struct StorageRegistry {
    containers: Vec<Container>,
    default: String,
}

impl StorageRegistry {
    /// Create every configured driver and bind its container.
    ///
    /// An existing container is not an error; it is opened as-is.
    pub fn configure(setup: &StorageSetup) -> StorageResult<Self> {
        let start = Instant::now();
        let default = setup.validate()?.to_string();
        let mut containers = Vec::with_capacity(setup.storages.len());

        for entry in &setup.storages {
            if entry.driver == DriverKind::Local {
                if let Some(root) = entry.options.key() {
                    std::fs::create_dir_all(root).map_err(|e| {
                        StorageError::ConfigError(format!(
                            "Failed to create directory {} for '{}' storage: {}",
                            root, entry.name, e
                        ))
                    })?;
                }
            }

            let driver = create_driver(entry.driver, &entry.options)?;

            match driver.create_container(&entry.name) {
                Ok(()) => {}
                Err(StorageError::AlreadyExists(_)) => {
                    tracing::debug!(container = %entry.name, "Container already exists");
                }
                Err(e) => return Err(e),
            }
            driver.get_container(&entry.name)?;

            tracing::info!(
                storage = %entry.name,
                driver = %entry.driver,
                "Storage container configured"
            );
            containers.push(Container::new(entry.name.clone(), driver));
        }

        tracing::info!(
            storages = containers.len(),
            default = %default,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Storage registry configured"
        );

        Ok(StorageRegistry {
            containers,
            default,
        })
    }

    /// Container for `name`, or the default container when `name` is `None`.
    pub fn get(&self, name: Option<&str>) -> StorageResult<&Container> {
        let name = name.unwrap_or(&self.default);
        self.containers
            .iter()
            .find(|container| container.name() == name)
            .ok_or_else(|| StorageError::NotFound(format!("{} storage has not been added", name)))
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Storage names in configuration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.containers.iter().map(Container::name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::DriverOptions;

    #[test]
    fn test_default_is_first_and_lookup_by_name() {
        let setup = StorageSetup::new()
            .with_storage("cloud", DriverKind::Memory, DriverOptions::new("a"))
            .with_storage("scratch", DriverKind::Memory, DriverOptions::new("b"));

        let registry = StorageRegistry::configure(&setup).unwrap();
        assert_eq!(registry.default_name(), "cloud");
        assert_eq!(registry.get(None).unwrap().name(), "cloud");
        assert_eq!(registry.get(Some("scratch")).unwrap().name(), "scratch");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["cloud", "scratch"]);
    }

    #[test]
    fn test_unknown_storage_is_not_found() {
        let setup =
            StorageSetup::new().with_storage("cloud", DriverKind::Memory, DriverOptions::new("a"));
        let registry = StorageRegistry::configure(&setup).unwrap();

        let err = registry.get(Some("images")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: images storage has not been added");
    }

    #[test]
    fn test_invalid_setup_is_config_error() {
        assert!(matches!(
            StorageRegistry::configure(&StorageSetup::new()),
            Err(StorageError::ConfigError(_))
        ));
    }

    #[cfg(feature = "storage-local")]
    #[test]
    fn test_local_storages_share_root_and_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("nested").join("root");
        let key = root.to_string_lossy().to_string();
        let setup = StorageSetup::new()
            .with_storage("files", DriverKind::Local, DriverOptions::new(key.clone()))
            .with_storage("images", DriverKind::Local, DriverOptions::new(key))
            .with_default("images");

        let registry = StorageRegistry::configure(&setup).unwrap();
        assert_eq!(registry.get(None).unwrap().name(), "images");
        assert!(root.join("files").is_dir());
        assert!(root.join("images").is_dir());

        // Existing containers are reopened
        assert!(StorageRegistry::configure(&setup).is_ok());
    }
}
